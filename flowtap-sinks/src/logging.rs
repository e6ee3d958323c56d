//! The simplest possible sink: one structured log line per decoded value.
//! Useful for manual inspection and as the default sink when nothing else
//! is configured.

use async_trait::async_trait;
use flowtap_core::{Direction, FlowKey};
use flowtap_session::Sink;
use flowtap_stream::{Resp, RespValue};
use tracing::info;

#[derive(Default)]
pub struct LoggingSink;

fn summarize(value: &RespValue) -> String {
    match value {
        RespValue::Array(items) => items
            .iter()
            .map(|r| summarize(&r.value))
            .collect::<Vec<_>>()
            .join(" "),
        RespValue::NullArray => "(nil-array)".to_string(),
        RespValue::BulkString(Some(b)) => String::from_utf8_lossy(b).into_owned(),
        RespValue::BulkString(None) => "(nil)".to_string(),
        RespValue::SimpleString(b) => String::from_utf8_lossy(b).into_owned(),
        RespValue::Error(b) => format!("ERR {}", String::from_utf8_lossy(b)),
        RespValue::Integer(b) => String::from_utf8_lossy(b).into_owned(),
    }
}

#[async_trait]
impl Sink for LoggingSink {
    async fn accept(&self, flow: FlowKey, direction: Direction, value: &Resp) {
        info!(
            %flow,
            ?direction,
            bytes = value.total_size,
            message = %summarize(&value.value),
            "decoded resp value"
        );
    }
}
