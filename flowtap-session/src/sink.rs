//! Sink adapter contract (`§4.5`).
//!
//! A [`Sink`] is the only thing downstream of decoding: it receives each
//! fully-decoded RESP value as it completes, tagged with the flow it came
//! from and which direction it travelled. Sinks never see raw bytes or
//! partially-decoded state.

use async_trait::async_trait;
use flowtap_core::{Direction, FlowKey};
use flowtap_stream::Resp;

/// Receives decoded RESP values as a flow produces them.
///
/// Implementations must not block the calling task for long: a slow sink
/// backs up every flow sharing its worker. `flowtap-sinks` ships a few
/// concrete implementations; a `Vec<Arc<dyn Sink>>` fan-out is the common
/// wiring in `flowtap-daemon`.
#[async_trait]
pub trait Sink: Send + Sync + 'static {
    async fn accept(&self, flow: FlowKey, direction: Direction, value: &Resp);
}

#[async_trait]
impl Sink for () {
    async fn accept(&self, _flow: FlowKey, _direction: Direction, _value: &Resp) {}
}
