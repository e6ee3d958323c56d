#![forbid(unsafe_code)]

//! Byte-stream machinery shared by every flow: out-of-order TCP segment
//! reassembly (`reorder`) and the incremental RESP2 decoder (`resp`) that
//! consumes the reassembled stream.

pub mod errors;
pub mod reorder;
pub mod resp;

pub use errors::Error;
pub use reorder::{Admitted, ReorderBuffer, Segment};
pub use resp::{Mode, Resp, RespDecoder, RespValue};
