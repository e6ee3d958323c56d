//! Per-direction TCP segment reassembly (`§4.2`).
//!
//! Buffers out-of-order segments in a sequence-keyed tree and releases them
//! in strictly ascending order. A capture is lossy by design: rather than
//! block forever on a missing segment, the buffer forces progress once it
//! has queued more than `gap_skip_threshold` segments waiting on one gap.

use std::collections::BTreeMap;

/// One observed TCP segment, reduced to what the reassembler needs.
#[derive(Debug, Clone)]
pub struct Segment {
    pub seq: u32,
    pub syn: bool,
    pub payload: Vec<u8>,
}

/// Reorders segments of a single flow direction by sequence number.
///
/// Sequence numbers are treated as plain unsigned integers; genuine 32-bit
/// wraparound is not given special comparator treatment (`§4.2` "Sequence
/// wrap") and instead relies on `gap_skip_threshold` to recover from the
/// phantom gap a wrap would otherwise create.
pub struct ReorderBuffer {
    next_seq: u32,
    initialized: bool,
    pending: BTreeMap<u32, Segment>,
    gap_skip_threshold: usize,
    missed_packets: u64,
}

/// Outcome of admitting one segment: zero or more segments now ready to
/// emit, in order.
pub struct Admitted {
    pub emitted: Vec<Segment>,
}

impl ReorderBuffer {
    pub fn new(gap_skip_threshold: usize) -> Self {
        Self {
            next_seq: 0,
            initialized: false,
            pending: BTreeMap::new(),
            gap_skip_threshold,
            missed_packets: 0,
        }
    }

    pub fn missed_packets(&self) -> u64 {
        self.missed_packets
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Admit one segment and drain whatever is now emittable.
    pub fn feed(&mut self, seg: Segment) -> Admitted {
        if seg.payload.is_empty() && !seg.syn {
            // No data to reorder: pure ACKs (including retransmit-triggering
            // ACKs) carry nothing the decoder can use.
            return Admitted { emitted: Vec::new() };
        }
        if self.initialized && seq_lt(seg.seq, self.next_seq) {
            // Expired retransmission: already consumed past this point.
            return Admitted { emitted: Vec::new() };
        }
        self.pending.entry(seg.seq).or_insert(seg);
        Admitted {
            emitted: self.drain_ready(),
        }
    }

    fn drain_ready(&mut self) -> Vec<Segment> {
        let mut out = Vec::new();
        loop {
            let Some((&head_seq, _)) = self.pending.iter().next() else {
                break;
            };
            let in_order = self.initialized && head_seq == self.next_seq;
            let first_ever = !self.initialized;
            let forced = self.pending.len() > self.gap_skip_threshold;
            if !(in_order || first_ever || forced) {
                break;
            }
            let seg = self
                .pending
                .remove(&head_seq)
                .expect("head key was just observed present");

            let was_gap_skip = forced && self.initialized && head_seq != self.next_seq;

            self.next_seq = if seg.syn {
                head_seq.wrapping_add(1)
            } else {
                head_seq.wrapping_add(seg.payload.len() as u32)
            };
            self.initialized = true;

            if was_gap_skip {
                self.missed_packets += 1;
            }

            out.push(seg);
        }
        out
    }
}

/// Unsigned sequence comparison (no wrap-window correction; see struct docs).
fn seq_lt(a: u32, b: u32) -> bool {
    a < b
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(seq: u32, payload: &[u8]) -> Segment {
        Segment {
            seq,
            syn: false,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn emits_in_order_from_permuted_input() {
        let mut buf = ReorderBuffer::new(200);
        let a = buf.feed(seg(10, b"A"));
        assert_eq!(a.emitted.len(), 1, "first packet always emits (nextSeq uninitialized)");
        assert_eq!(a.emitted[0].seq, 10);

        let b = buf.feed(seg(12, b"C")); // gap at 11
        assert!(b.emitted.is_empty());

        let c = buf.feed(seg(11, b"B")); // fills gap, both 11 and 12 ready
        assert_eq!(c.emitted.len(), 2);
        assert_eq!(c.emitted[0].seq, 11);
        assert_eq!(c.emitted[1].seq, 12);
        assert_eq!(buf.missed_packets(), 0);
    }

    #[test]
    fn drops_expired_retransmission() {
        let mut buf = ReorderBuffer::new(200);
        buf.feed(seg(10, b"A"));
        let dup = buf.feed(seg(10, b"A"));
        assert!(dup.emitted.is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn drops_pure_ack_with_no_payload() {
        let mut buf = ReorderBuffer::new(200);
        let ack = Segment {
            seq: 1,
            syn: false,
            payload: Vec::new(),
        };
        let out = buf.feed(ack);
        assert!(out.emitted.is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn gap_skip_forces_progress_past_a_missing_segment() {
        // Small threshold so the mechanic is exercised deterministically:
        // prime next_seq at 1, then queue segments 2..=7 while 1 stays
        // missing. The 6th queued segment pushes pending past the
        // threshold of 5, forcing the head out even though it isn't
        // next_seq, which then lets the rest drain in order behind it.
        let mut buf = ReorderBuffer::new(5);
        buf.feed(seg(0, b"x"));
        let mut emitted = Vec::new();
        for seq in 2..=7u32 {
            emitted = buf.feed(seg(seq, b"y")).emitted;
        }
        assert_eq!(buf.missed_packets(), 1);
        assert_eq!(
            emitted.iter().map(|s| s.seq).collect::<Vec<_>>(),
            vec![2, 3, 4, 5, 6, 7]
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn gap_skip_with_more_than_threshold_subsequent_segments_in_reverse() {
        // One segment (seq 50) never arrives; more than
        // GAP_SKIP_THRESHOLD segments behind it arrive out of order. The
        // forced pop releases whatever contiguous run is already queued
        // behind the gap -- here 100..=300 -- in one sweep. Anything still
        // missing at that moment (51..=99) arrives "too late": its
        // sequence numbers are now below next_seq and it is dropped as an
        // expired segment, same as upstream's red-black-tree version.
        // Exactly one gap-skip event is counted regardless.
        let mut buf = ReorderBuffer::new(200);
        for seq in 1..50u32 {
            buf.feed(seg(seq, b"a"));
        }
        let mut all_emitted = Vec::new();
        for seq in (51..=300u32).rev() {
            all_emitted.extend(buf.feed(seg(seq, b"a")).emitted.into_iter().map(|s| s.seq));
        }
        assert_eq!(buf.missed_packets(), 1);
        assert_eq!(all_emitted, (100..=300u32).collect::<Vec<_>>());
        assert!(buf.is_empty());
    }

    #[test]
    fn syn_advances_next_seq_by_one() {
        let mut buf = ReorderBuffer::new(200);
        let syn = Segment {
            seq: 100,
            syn: true,
            payload: Vec::new(),
        };
        let out = buf.feed(syn);
        assert_eq!(out.emitted.len(), 1);
        let next = buf.feed(seg(101, b"A"));
        assert_eq!(next.emitted.len(), 1);
    }
}
