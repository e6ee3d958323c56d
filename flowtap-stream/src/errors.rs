pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("malformed framing: {0}")]
    MalformedFraming(String),
    #[error("zero-copy contract violated: {0}")]
    BufferNotDrained(String),
}

impl Error {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedFraming(msg.into())
    }
}
