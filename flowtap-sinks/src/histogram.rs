//! Tracks the distribution of decoded value sizes (`total_size` in bytes)
//! per direction, for spotting oversized payloads or workload shifts.

use async_trait::async_trait;
use flowtap_core::{Direction, FlowKey};
use flowtap_session::Sink;
use flowtap_stream::Resp;
use hdrhistogram::Histogram;
use parking_lot::Mutex;

const MAX_TRACKABLE_BYTES: u64 = 64 * 1024 * 1024;
const SIGNIFICANT_DIGITS: u8 = 3;

pub struct SizeHistogramSink {
    inbound: Mutex<Histogram<u64>>,
    outbound: Mutex<Histogram<u64>>,
}

impl Default for SizeHistogramSink {
    fn default() -> Self {
        Self::new()
    }
}

impl SizeHistogramSink {
    pub fn new() -> Self {
        let new_hist = || {
            Histogram::new_with_bounds(1, MAX_TRACKABLE_BYTES, SIGNIFICANT_DIGITS)
                .expect("static histogram bounds are valid")
        };
        Self {
            inbound: Mutex::new(new_hist()),
            outbound: Mutex::new(new_hist()),
        }
    }

    fn histogram(&self, direction: Direction) -> &Mutex<Histogram<u64>> {
        match direction {
            Direction::In => &self.inbound,
            Direction::Out => &self.outbound,
        }
    }

    pub fn percentile(&self, direction: Direction, percentile: f64) -> u64 {
        self.histogram(direction).lock().value_at_percentile(percentile)
    }

    pub fn len(&self, direction: Direction) -> u64 {
        self.histogram(direction).lock().len()
    }

    pub fn is_empty(&self, direction: Direction) -> bool {
        self.len(direction) == 0
    }
}

#[async_trait]
impl Sink for SizeHistogramSink {
    async fn accept(&self, _flow: FlowKey, direction: Direction, value: &Resp) {
        let size = value.total_size.max(1) as u64;
        let size = size.min(MAX_TRACKABLE_BYTES);
        if let Err(e) = self.histogram(direction).lock().record(size) {
            tracing::warn!(error = %e, "failed to record size sample");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn tracks_p99_across_samples() {
        let sink = SizeHistogramSink::new();
        let flow = FlowKey::new(Ipv4Addr::new(10, 0, 0, 2), 1);
        for size in [10u64, 20, 30, 1000] {
            let resp = Resp {
                value: flowtap_stream::RespValue::Integer(bytes::Bytes::from_static(b"1")),
                total_size: size as usize,
            };
            sink.accept(flow, Direction::In, &resp).await;
        }
        assert_eq!(sink.len(Direction::In), 4);
        assert!(sink.percentile(Direction::In, 99.0) >= 30);
        assert!(sink.is_empty(Direction::Out));
    }
}
