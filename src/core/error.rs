use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Io,
    Decode,
    Execution,
    Setup,
    Internal,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: String) -> Self {
        Error { kind, context }
    }

    pub fn config(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Config, context.into())
    }

    pub fn internal(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Internal, context.into())
    }

    pub fn execution(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Execution, context.into())
    }

    pub fn decode(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Decode, context.into())
    }

    pub fn setup(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Setup, context.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Io,
            context: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Io,
            context: format!("JSON error: {}", err),
        }
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        let kind = if err.is_io_error() { ErrorKind::Io } else { ErrorKind::Decode };
        Error {
            kind,
            context: format!("CSV error: {}", err),
        }
    }
}

impl From<hdrhistogram::CreationError> for Error {
    fn from(err: hdrhistogram::CreationError) -> Self {
        Error {
            kind: ErrorKind::Setup,
            context: format!("histogram creation failed: {:?}", err),
        }
    }
}

impl From<hdrhistogram::serialization::V2DeflateSerializeError> for Error {
    fn from(err: hdrhistogram::serialization::V2DeflateSerializeError) -> Self {
        Error {
            kind: ErrorKind::Internal,
            context: format!("histogram encoding failed: {:?}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
