//! A single tracked flow: one [`ReorderBuffer`]+[`RespDecoder`] pair per
//! direction, plus the last-activity timestamp eviction keys off.

use std::time::Instant;

use flowtap_core::Direction;
use flowtap_stream::{ReorderBuffer, RespDecoder, Segment};
use tracing::warn;

use crate::packet::TcpPacket;

struct DirectionState {
    reorder: ReorderBuffer,
    decoder: RespDecoder,
}

/// Per-flow state: two independent byte streams (client->server,
/// server->client) sharing nothing but the eviction clock.
pub struct Flow {
    inbound: DirectionState,
    outbound: DirectionState,
    last_activity: Instant,
    reported_missed: u64,
}

impl Flow {
    pub fn new(gap_skip_threshold: usize) -> Self {
        let now = Instant::now();
        Self {
            inbound: DirectionState {
                reorder: ReorderBuffer::new(gap_skip_threshold),
                decoder: RespDecoder::new_request(),
            },
            outbound: DirectionState {
                reorder: ReorderBuffer::new(gap_skip_threshold),
                decoder: RespDecoder::new_response(),
            },
            last_activity: now,
            reported_missed: 0,
        }
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    fn state_mut(&mut self, direction: Direction) -> &mut DirectionState {
        match direction {
            Direction::In => &mut self.inbound,
            Direction::Out => &mut self.outbound,
        }
    }

    /// Admit a packet for the given direction, decode whatever RESP values
    /// the now-contiguous stream completes, and return them in order.
    ///
    /// Errors from a malformed stream are swallowed after a `warn!` log and
    /// the decoder resyncs on the next call, per `§7` (a capture tap must
    /// never let one bad flow take the process down).
    pub fn feed(&mut self, direction: Direction, pkt: TcpPacket) -> Vec<flowtap_stream::Resp> {
        self.last_activity = Instant::now();
        let state = self.state_mut(direction);
        let admitted = state.reorder.feed(Segment {
            seq: pkt.seq,
            syn: pkt.syn,
            payload: pkt.payload,
        });

        let mut out = Vec::new();
        for seg in admitted.emitted {
            if seg.payload.is_empty() {
                continue;
            }
            if let Err(e) = state.decoder.feed(&seg.payload) {
                warn!(error = %e, ?direction, "resp decode error, resyncing stream");
                continue;
            }
            while let Some(value) = state.decoder.try_decode() {
                out.push(value);
            }
        }
        out
    }

    pub fn missed_packets(&self) -> u64 {
        self.inbound.reorder.missed_packets() + self.outbound.reorder.missed_packets()
    }

    /// Gap-skip events observed since the last call to this method, for
    /// accumulating into a process-wide counter rather than overwriting it
    /// with this one flow's running total.
    pub fn missed_delta(&mut self) -> u64 {
        let total = self.missed_packets();
        let delta = total.saturating_sub(self.reported_missed);
        self.reported_missed = total;
        delta
    }
}
