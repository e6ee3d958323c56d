//! Streaming RESP2 decoder (`§4.3`).
//!
//! The decoder consumes successive byte slices via [`RespDecoder::feed`] and
//! [`RespDecoder::try_decode`] pulls complete values out as they become
//! available, preserving parser state across arbitrarily fragmented input --
//! down to one byte at a time. Two variants are selected at construction:
//! [`RespDecoder::new_request`] expects only arrays of bulk strings (the
//! Redis request form), [`RespDecoder::new_response`] accepts any RESP2
//! value, including nested arrays, via an explicit frame stack rather than
//! recursion.

use bytes::Bytes;

use crate::errors::Error;

const INT_SCRATCH_LEN: usize = 13;
const LINE_SCRATCH_LEN: usize = 128;

/// A fully decoded RESP2 value, paired with the number of input bytes
/// (including framing and terminators) consumed to produce it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resp {
    pub value: RespValue,
    pub total_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    Array(Vec<Resp>),
    /// RESP2 distinguishes a null array (`*-1\r\n`) from an empty one
    /// (`*0\r\n`); the response decoder is the only side that can observe
    /// it, per framing rules.
    NullArray,
    BulkString(Option<Bytes>),
    SimpleString(Bytes),
    Error(Bytes),
    /// Decimal text is preserved verbatim; numeric parsing is the sink's
    /// concern.
    Integer(Bytes),
}

impl Resp {
    pub fn is_null(&self) -> bool {
        matches!(self.value, RespValue::BulkString(None) | RespValue::NullArray)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Only arrays of bulk strings are accepted.
    Request,
    /// Any RESP2 value is accepted, arrays may nest.
    Response,
}

#[derive(Debug, Clone, Copy)]
enum LineKind {
    Simple,
    Err,
    Integer,
}

#[derive(Debug, Clone, Copy)]
enum TrailStage {
    Cr,
    Lf,
}

/// Fixed-capacity scratch buffer for the digits of an array/bulk length or
/// an integer reply; 13 bytes covers any signed 64-bit decimal plus sign.
#[derive(Debug)]
struct NumLine {
    buf: [u8; INT_SCRATCH_LEN],
    len: usize,
}

impl NumLine {
    fn new() -> Self {
        Self {
            buf: [0; INT_SCRATCH_LEN],
            len: 0,
        }
    }

    fn push(&mut self, b: u8) -> Result<(), Error> {
        if self.len >= self.buf.len() {
            return Err(Error::malformed("numeric token exceeds scratch capacity"));
        }
        self.buf[self.len] = b;
        self.len += 1;
        Ok(())
    }

    fn parse_i64(&self) -> Result<i64, Error> {
        std::str::from_utf8(&self.buf[..self.len])
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| Error::malformed("non-numeric length"))
    }
}

/// Scratch buffer for simple-string/error/integer body text: 128 bytes
/// preallocated, spilling to the heap only for unusually long lines.
#[derive(Debug)]
struct LineBuf {
    buf: [u8; LINE_SCRATCH_LEN],
    len: usize,
    overflow: Vec<u8>,
}

impl LineBuf {
    fn new() -> Self {
        Self {
            buf: [0; LINE_SCRATCH_LEN],
            len: 0,
            overflow: Vec::new(),
        }
    }

    fn push(&mut self, b: u8) {
        if self.overflow.is_empty() && self.len < self.buf.len() {
            self.buf[self.len] = b;
            self.len += 1;
        } else {
            if self.overflow.is_empty() {
                self.overflow.extend_from_slice(&self.buf[..self.len]);
            }
            self.overflow.push(b);
        }
    }

    fn into_bytes(self) -> Bytes {
        if self.overflow.is_empty() {
            Bytes::copy_from_slice(&self.buf[..self.len])
        } else {
            Bytes::from(self.overflow)
        }
    }
}

enum State {
    Type,
    ArrayLen {
        num: NumLine,
        saw_cr: bool,
    },
    BulkLen {
        num: NumLine,
        saw_cr: bool,
    },
    BulkData {
        remaining: usize,
        data: Vec<u8>,
    },
    BulkTrail {
        data: Vec<u8>,
        stage: TrailStage,
    },
    SimpleLine {
        kind: LineKind,
        line: LineBuf,
        saw_cr: bool,
    },
}

/// One array awaiting its remaining elements.
struct Frame {
    remaining: i64,
    items: Vec<Resp>,
    header_size: usize,
    bytes_sum: usize,
}

/// Incremental RESP2 parser. See module docs for the two variants.
pub struct RespDecoder {
    mode: Mode,
    input: Bytes,
    pos: usize,
    state: State,
    stack: Vec<Frame>,
    current_size: usize,
}

impl RespDecoder {
    pub fn new_request() -> Self {
        Self::new(Mode::Request)
    }

    pub fn new_response() -> Self {
        Self::new(Mode::Response)
    }

    fn new(mode: Mode) -> Self {
        Self {
            mode,
            input: Bytes::new(),
            pos: 0,
            state: State::Type,
            stack: Vec::new(),
            current_size: 0,
        }
    }

    /// Append a new payload slice. The previous slice must already be fully
    /// consumed by `try_decode` -- handing in a new slice while bytes remain
    /// is a caller bug, not a data error, so it is reported distinctly.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if self.pos != self.input.len() {
            return Err(Error::BufferNotDrained(format!(
                "{} unconsumed byte(s) remain from the previous payload",
                self.input.len() - self.pos
            )));
        }
        self.input = Bytes::copy_from_slice(bytes);
        self.pos = 0;
        Ok(())
    }

    /// Pull one complete value out of everything fed so far. Returns `None`
    /// when the currently buffered bytes do not yet contain a full value;
    /// call `feed` again and retry.
    pub fn try_decode(&mut self) -> Option<Resp> {
        loop {
            let state = std::mem::replace(&mut self.state, State::Type);
            match state {
                State::Type => {
                    if self.pos >= self.input.len() {
                        self.state = State::Type;
                        return None;
                    }
                    let b = self.input[self.pos];
                    self.pos += 1;
                    self.current_size = 1;
                    let nested = !self.stack.is_empty();
                    match b {
                        b'*' => {
                            if self.mode == Mode::Request && nested {
                                self.resync("nested array in request stream");
                                continue;
                            }
                            self.state = State::ArrayLen {
                                num: NumLine::new(),
                                saw_cr: false,
                            };
                        }
                        b'$' => {
                            if self.mode == Mode::Request && !nested {
                                self.resync("bulk string outside a request array");
                                continue;
                            }
                            self.state = State::BulkLen {
                                num: NumLine::new(),
                                saw_cr: false,
                            };
                        }
                        b'+' | b'-' | b':' if self.mode == Mode::Response => {
                            let kind = match b {
                                b'+' => LineKind::Simple,
                                b'-' => LineKind::Err,
                                _ => LineKind::Integer,
                            };
                            self.state = State::SimpleLine {
                                kind,
                                line: LineBuf::new(),
                                saw_cr: false,
                            };
                        }
                        other => {
                            self.resync(&format!("unexpected type byte {other:#04x}"));
                            continue;
                        }
                    }
                }
                State::ArrayLen { mut num, mut saw_cr } => {
                    match self.feed_num_line(&mut num, &mut saw_cr) {
                        None => {
                            self.state = State::ArrayLen { num, saw_cr };
                            return None;
                        }
                        Some(Err(e)) => {
                            self.resync(&e.to_string());
                            continue;
                        }
                        Some(Ok(())) => {
                            let len = match num.parse_i64() {
                                Ok(n) => n,
                                Err(e) => {
                                    self.resync(&e.to_string());
                                    continue;
                                }
                            };
                            let header_size = self.current_size;
                            if len < 0 {
                                if self.mode == Mode::Request {
                                    self.resync("null array is not valid request framing");
                                    continue;
                                }
                                if let Some(v) = self.complete_value(Resp {
                                    value: RespValue::NullArray,
                                    total_size: header_size,
                                }) {
                                    return Some(v);
                                }
                                continue;
                            }
                            if len == 0 {
                                if let Some(v) = self.complete_value(Resp {
                                    value: RespValue::Array(Vec::new()),
                                    total_size: header_size,
                                }) {
                                    return Some(v);
                                }
                                continue;
                            }
                            self.stack.push(Frame {
                                remaining: len,
                                items: Vec::with_capacity(len as usize),
                                header_size,
                                bytes_sum: 0,
                            });
                            self.state = State::Type;
                        }
                    }
                }
                State::BulkLen { mut num, mut saw_cr } => {
                    match self.feed_num_line(&mut num, &mut saw_cr) {
                        None => {
                            self.state = State::BulkLen { num, saw_cr };
                            return None;
                        }
                        Some(Err(e)) => {
                            self.resync(&e.to_string());
                            continue;
                        }
                        Some(Ok(())) => {
                            let len = match num.parse_i64() {
                                Ok(n) => n,
                                Err(e) => {
                                    self.resync(&e.to_string());
                                    continue;
                                }
                            };
                            if len < 0 {
                                if let Some(v) = self.complete_value(Resp {
                                    value: RespValue::BulkString(None),
                                    total_size: self.current_size,
                                }) {
                                    return Some(v);
                                }
                                continue;
                            }
                            self.state = State::BulkData {
                                remaining: len as usize,
                                data: Vec::with_capacity(len as usize),
                            };
                        }
                    }
                }
                State::BulkData {
                    mut remaining,
                    mut data,
                } => {
                    if !self.feed_bulk_data(&mut remaining, &mut data) {
                        self.state = State::BulkData { remaining, data };
                        return None;
                    }
                    self.state = State::BulkTrail {
                        data,
                        stage: TrailStage::Cr,
                    };
                }
                State::BulkTrail { data, stage } => match self.feed_bulk_trail(data, stage) {
                    Ok(None) => return None,
                    Ok(Some(resp)) => {
                        if let Some(v) = self.complete_value(resp) {
                            return Some(v);
                        }
                        continue;
                    }
                    Err(reason) => {
                        self.resync(&reason);
                        continue;
                    }
                },
                State::SimpleLine {
                    kind,
                    mut line,
                    mut saw_cr,
                } => match self.feed_line_buf(&mut line, &mut saw_cr) {
                    None => {
                        self.state = State::SimpleLine { kind, line, saw_cr };
                        return None;
                    }
                    Some(Err(e)) => {
                        self.resync(&e.to_string());
                        continue;
                    }
                    Some(Ok(())) => {
                        let total_size = self.current_size;
                        let bytes = line.into_bytes();
                        let value = match kind {
                            LineKind::Simple => RespValue::SimpleString(bytes),
                            LineKind::Err => RespValue::Error(bytes),
                            LineKind::Integer => RespValue::Integer(bytes),
                        };
                        if let Some(v) = self.complete_value(Resp { value, total_size }) {
                            return Some(v);
                        }
                    }
                },
            }
        }
    }

    /// Either hand a completed value up to the enclosing array frame, or --
    /// if there is none -- return it to the caller.
    fn complete_value(&mut self, resp: Resp) -> Option<Resp> {
        self.state = State::Type;
        let Some(frame) = self.stack.last_mut() else {
            return Some(resp);
        };
        frame.bytes_sum += resp.total_size;
        frame.items.push(resp);
        frame.remaining -= 1;
        if frame.remaining > 0 {
            return None;
        }
        match self.stack.pop() {
            Some(frame) => self.complete_value(Resp {
                value: RespValue::Array(frame.items),
                total_size: frame.header_size + frame.bytes_sum,
            }),
            None => None,
        }
    }

    fn resync(&mut self, reason: &str) {
        tracing::error!(mode = ?self.mode, reason, "resp decoder: malformed framing, resynchronizing");
        self.state = State::Type;
        self.stack.clear();
    }

    fn feed_num_line(&mut self, num: &mut NumLine, saw_cr: &mut bool) -> Option<Result<(), Error>> {
        loop {
            if self.pos >= self.input.len() {
                return None;
            }
            let b = self.input[self.pos];
            self.pos += 1;
            self.current_size += 1;
            if *saw_cr {
                return Some(if b == b'\n' {
                    Ok(())
                } else {
                    Err(Error::malformed("CR not followed by LF"))
                });
            }
            if b == b'\r' {
                *saw_cr = true;
                continue;
            }
            if let Err(e) = num.push(b) {
                return Some(Err(e));
            }
        }
    }

    fn feed_line_buf(&mut self, line: &mut LineBuf, saw_cr: &mut bool) -> Option<Result<(), Error>> {
        loop {
            if self.pos >= self.input.len() {
                return None;
            }
            let b = self.input[self.pos];
            self.pos += 1;
            self.current_size += 1;
            if *saw_cr {
                return Some(if b == b'\n' {
                    Ok(())
                } else {
                    Err(Error::malformed("CR not followed by LF"))
                });
            }
            if b == b'\r' {
                *saw_cr = true;
                continue;
            }
            line.push(b);
        }
    }

    /// Copies exactly `remaining` bytes, byte-accurate even across embedded
    /// CRLFs; returns true once the full body has been copied.
    fn feed_bulk_data(&mut self, remaining: &mut usize, data: &mut Vec<u8>) -> bool {
        let avail = self.input.len() - self.pos;
        if avail == 0 {
            return *remaining == 0;
        }
        let take = avail.min(*remaining);
        data.extend_from_slice(&self.input[self.pos..self.pos + take]);
        self.pos += take;
        self.current_size += take;
        *remaining -= take;
        *remaining == 0
    }

    fn feed_bulk_trail(
        &mut self,
        data: Vec<u8>,
        mut stage: TrailStage,
    ) -> Result<Option<Resp>, String> {
        loop {
            if self.pos >= self.input.len() {
                self.state = State::BulkTrail { data, stage };
                return Ok(None);
            }
            let b = self.input[self.pos];
            self.pos += 1;
            self.current_size += 1;
            match stage {
                TrailStage::Cr => {
                    if b != b'\r' {
                        return Err("bulk string missing CR terminator".to_string());
                    }
                    stage = TrailStage::Lf;
                }
                TrailStage::Lf => {
                    if b != b'\n' {
                        return Err("bulk string missing LF terminator".to_string());
                    }
                    let total_size = self.current_size;
                    return Ok(Some(Resp {
                        value: RespValue::BulkString(Some(Bytes::from(data))),
                        total_size,
                    }));
                }
            }
        }
    }
}


#[cfg(test)]
mod chunking_properties {
    use super::*;
    use proptest::prelude::*;

    fn encode_request(args: &[String]) -> Vec<u8> {
        let mut out = format!("*{}\r\n", args.len()).into_bytes();
        for arg in args {
            out.extend(format!("${}\r\n", arg.len()).into_bytes());
            out.extend(arg.as_bytes());
            out.extend(b"\r\n");
        }
        out
    }

    proptest! {
        // For all partitions `S = p1 ++ ... ++ pn` of a valid request's
        // bytes, feeding the decoder each `pi` in turn yields the same
        // value (and total_size) as feeding `S` whole -- the chunking
        // invariance this decoder is built to hold under arbitrary TCP
        // segmentation, down to single bytes.
        #[test]
        fn decoding_is_invariant_to_arbitrary_chunking(
            args in prop::collection::vec("[a-zA-Z0-9]{0,12}", 1..6),
            chunk_sizes in prop::collection::vec(1usize..7, 1..40),
        ) {
            let bytes = encode_request(&args);

            let mut whole = RespDecoder::new_request();
            whole.feed(&bytes).unwrap();
            let whole_value = whole.try_decode().expect("whole payload decodes");

            let mut partial = RespDecoder::new_request();
            let mut sizes = chunk_sizes.into_iter().cycle();
            let mut offset = 0;
            let mut got = None;
            while offset < bytes.len() {
                let take = sizes.next().unwrap().min(bytes.len() - offset);
                partial.feed(&bytes[offset..offset + take]).unwrap();
                offset += take;
                if let Some(v) = partial.try_decode() {
                    got = Some(v);
                }
            }
            let got = got.expect("partitioned feed decodes to the same value");

            prop_assert_eq!(got.value, whole_value.value);
            prop_assert_eq!(got.total_size, whole_value.total_size);
        }
    }
}
