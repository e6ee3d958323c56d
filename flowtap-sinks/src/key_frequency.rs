//! Counts how often each command/key pair appears across every flow's
//! request stream, the simplest "what is this workload doing" sink.

use async_trait::async_trait;
use dashmap::DashMap;
use flowtap_core::{Direction, FlowKey};
use flowtap_session::Sink;
use flowtap_stream::{Resp, RespValue};

/// Tracks per-command invocation counts observed on the `In` (request)
/// direction. `Out` values are ignored: commands only travel client to
/// server under RESP2.
#[derive(Default)]
pub struct KeyFrequencySink {
    counts: DashMap<String, u64>,
}

impl KeyFrequencySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<(String, u64)> {
        let mut out: Vec<_> = self
            .counts
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }

    fn command_name(value: &RespValue) -> Option<String> {
        let RespValue::Array(items) = value else {
            return None;
        };
        let first = items.first()?;
        match &first.value {
            RespValue::BulkString(Some(b)) => {
                Some(String::from_utf8_lossy(b).to_ascii_uppercase())
            }
            _ => None,
        }
    }
}

#[async_trait]
impl Sink for KeyFrequencySink {
    async fn accept(&self, _flow: FlowKey, direction: Direction, value: &Resp) {
        if direction != Direction::In {
            return;
        }
        if let Some(cmd) = Self::command_name(&value.value) {
            *self.counts.entry(cmd).or_insert(0) += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::net::Ipv4Addr;

    fn array_resp(cmd: &str) -> Resp {
        Resp {
            value: RespValue::Array(vec![Resp {
                value: RespValue::BulkString(Some(Bytes::copy_from_slice(cmd.as_bytes()))),
                total_size: 0,
            }]),
            total_size: 0,
        }
    }

    #[tokio::test]
    async fn counts_commands_case_insensitively() {
        let sink = KeyFrequencySink::new();
        let flow = FlowKey::new(Ipv4Addr::new(10, 0, 0, 2), 1);
        sink.accept(flow, Direction::In, &array_resp("get")).await;
        sink.accept(flow, Direction::In, &array_resp("GET")).await;
        sink.accept(flow, Direction::Out, &array_resp("set")).await;
        let snap = sink.snapshot();
        assert_eq!(snap[0], ("GET".to_string(), 2));
    }
}
