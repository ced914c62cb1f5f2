use std::fmt::Display;
use std::io;

/// siltdb errors.
#[derive(Debug)]
pub enum Error {
    /// An underlying filesystem operation failed.
    Io(io::Error),
    /// A segment line did not split into exactly a key and a value.
    MalformedSegment(String),
    /// A segment name does not have the `basename-N` form and cannot be
    /// advanced.
    MalformedSegmentName(String),
    /// A key or value is empty or contains a delimiter character.
    InvalidRecord(String),
    /// Persisted metadata or a bloom filter blob failed to parse.
    Decode(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::MalformedSegment(line) => write!(f, "malformed segment line: {line:?}"),
            Error::MalformedSegmentName(name) => write!(f, "malformed segment name: {name:?}"),
            Error::InvalidRecord(msg) => write!(f, "invalid record: {msg}"),
            Error::Decode(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}

/// A siltdb Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let err = Error::MalformedSegment("red,1,extra".to_string());
        assert_eq!(err.to_string(), "malformed segment line: \"red,1,extra\"");

        let err = Error::MalformedSegmentName("segment_one".to_string());
        assert_eq!(err.to_string(), "malformed segment name: \"segment_one\"");
    }

    #[test]
    fn io_errors_convert() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn json_errors_become_decode() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Decode(_)));
    }
}
