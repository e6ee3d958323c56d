//! Direction classification (`§4.1`).
//!
//! Decides whether a captured segment is flowing towards the monitored
//! Redis instance (`In`) or away from it (`Out`), and derives the
//! [`FlowKey`] a session is tracked under. A packet that matches neither
//! the local host nor the local port is not part of any flow we track.

use flowtap_core::{Direction, FlowKey};

use crate::packet::TcpPacket;

pub struct Classifier {
    local_host: std::net::Ipv4Addr,
    local_port: u16,
    only_in: bool,
}

/// A packet resolved to a direction and the flow it belongs to.
pub struct Classified {
    pub flow_key: FlowKey,
    pub direction: Direction,
}

impl Classifier {
    pub fn new(local_host: std::net::Ipv4Addr, local_port: u16, only_in: bool) -> Self {
        Self {
            local_host,
            local_port,
            only_in,
        }
    }

    /// Classify one packet, or `None` if it is not addressed to/from the
    /// monitored port and should be dropped before it ever reaches a
    /// [`crate::manager::SessionManager`].
    pub fn classify(&self, pkt: &TcpPacket) -> Option<Classified> {
        if pkt.src_host == self.local_host && pkt.src_port == self.local_port {
            // `only_in` still lets an RST through: the flow must still be
            // torn down on RST regardless of which directions get decoded,
            // so the manager's teardown check sees it.
            if self.only_in && !pkt.rst {
                return None;
            }
            return Some(Classified {
                flow_key: FlowKey::new(pkt.dst_host, pkt.dst_port),
                direction: Direction::Out,
            });
        }
        if pkt.dst_host == self.local_host && pkt.dst_port == self.local_port {
            return Some(Classified {
                flow_key: FlowKey::new(pkt.src_host, pkt.src_port),
                direction: Direction::In,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn pkt(src: (Ipv4Addr, u16), dst: (Ipv4Addr, u16)) -> TcpPacket {
        TcpPacket {
            src_host: src.0,
            src_port: src.1,
            dst_host: dst.0,
            dst_port: dst.1,
            seq: 0,
            syn: false,
            fin: false,
            rst: false,
            psh: true,
            payload: vec![1],
        }
    }

    #[test]
    fn inbound_packet_keyed_by_remote_peer() {
        let local = Ipv4Addr::new(10, 0, 0, 1);
        let remote = Ipv4Addr::new(10, 0, 0, 2);
        let c = Classifier::new(local, 6379, false);
        let classified = c.classify(&pkt((remote, 5555), (local, 6379))).unwrap();
        assert_eq!(classified.direction, Direction::In);
        assert_eq!(classified.flow_key, FlowKey::new(remote, 5555));
    }

    #[test]
    fn outbound_packet_dropped_when_only_in() {
        let local = Ipv4Addr::new(10, 0, 0, 1);
        let remote = Ipv4Addr::new(10, 0, 0, 2);
        let c = Classifier::new(local, 6379, true);
        assert!(c.classify(&pkt((local, 6379), (remote, 5555))).is_none());
    }

    #[test]
    fn outbound_rst_is_classified_even_when_only_in() {
        let local = Ipv4Addr::new(10, 0, 0, 1);
        let remote = Ipv4Addr::new(10, 0, 0, 2);
        let c = Classifier::new(local, 6379, true);
        let mut rst = pkt((local, 6379), (remote, 5555));
        rst.rst = true;
        let classified = c.classify(&rst).expect("rst must still classify for teardown");
        assert_eq!(classified.direction, Direction::Out);
        assert_eq!(classified.flow_key, FlowKey::new(remote, 5555));
    }

    #[test]
    fn unrelated_packet_is_not_classified() {
        let local = Ipv4Addr::new(10, 0, 0, 1);
        let a = Ipv4Addr::new(10, 0, 0, 2);
        let b = Ipv4Addr::new(10, 0, 0, 3);
        let c = Classifier::new(local, 6379, false);
        assert!(c.classify(&pkt((a, 1), (b, 2))).is_none());
    }
}
