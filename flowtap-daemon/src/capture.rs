//! Capture front-end (`§6`): turns a live interface or a pcap file into a
//! stream of [`TcpPacket`]s delivered over a channel, one producer, many
//! worker consumers.

use std::net::Ipv4Addr;
use std::path::Path;

use flowtap_session::TcpPacket;
use pcap::Capture;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::tcp::{TcpFlags, TcpPacket as PnetTcpPacket};
use pnet::packet::Packet;
use tokio::sync::mpsc;

/// Parse one raw captured frame into a [`TcpPacket`], or `None` if it
/// isn't an Ethernet/IPv4/TCP frame the core cares about.
pub fn parse_frame(frame: &[u8]) -> Option<TcpPacket> {
    let eth = EthernetPacket::new(frame)?;
    if eth.get_ethertype() != EtherTypes::Ipv4 {
        return None;
    }
    let ip = Ipv4Packet::new(eth.payload())?;
    if ip.get_next_level_protocol() != IpNextHeaderProtocols::Tcp {
        return None;
    }
    let tcp = PnetTcpPacket::new(ip.payload())?;

    let flags = tcp.get_flags();
    Some(TcpPacket {
        src_host: ip.get_source(),
        src_port: tcp.get_source(),
        dst_host: ip.get_destination(),
        dst_port: tcp.get_destination(),
        seq: tcp.get_sequence(),
        syn: flags & TcpFlags::SYN != 0,
        fin: flags & TcpFlags::FIN != 0,
        rst: flags & TcpFlags::RST != 0,
        psh: flags & TcpFlags::PSH != 0,
        payload: tcp.payload().to_vec(),
    })
}

/// Open a live interface and stream every IPv4/TCP frame into `tx`, tagged
/// to the configured `(local_host, local_port)` pair via a BPF filter so
/// the kernel drops unrelated traffic before it ever reaches userspace.
pub fn spawn_live_capture(
    interface: String,
    local_host: Ipv4Addr,
    local_port: u16,
    tx: mpsc::Sender<TcpPacket>,
) -> anyhow::Result<()> {
    let mut cap = Capture::from_device(interface.as_str())?
        .promisc(true)
        .snaplen(65535)
        .open()?;
    cap.filter(&format!("tcp and host {local_host} and port {local_port}"), true)?;

    std::thread::spawn(move || {
        while let Ok(packet) = cap.next_packet() {
            if let Some(parsed) = parse_frame(packet.data) {
                if tx.blocking_send(parsed).is_err() {
                    break;
                }
            }
        }
    });
    Ok(())
}

/// Replay every frame in a pcap file through the same parsing path as live
/// capture, for offline testing and reproduction of a captured incident.
pub fn spawn_replay(path: impl AsRef<Path>, tx: mpsc::Sender<TcpPacket>) -> anyhow::Result<()> {
    let mut cap = Capture::from_file(path.as_ref())?;
    let path = path.as_ref().to_path_buf();
    std::thread::spawn(move || {
        loop {
            match cap.next_packet() {
                Ok(packet) => {
                    if let Some(parsed) = parse_frame(packet.data) {
                        if tx.blocking_send(parsed).is_err() {
                            break;
                        }
                    }
                }
                Err(pcap::Error::NoMorePackets) => {
                    tracing::info!(path = %path.display(), "replay finished");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "capture read error");
                    break;
                }
            }
        }
    });
    Ok(())
}
