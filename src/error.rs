//! A dedicated error for all possible errors in the cache: I/O, upstream fetches, snapshot decoding, etc
use std::io;
use std::num::ParseIntError;

#[derive(Debug)]
pub enum IRRError {
    Io(io::Error),
    FromUtf8(std::string::FromUtf8Error),
    ParseInt(ParseIntError),
    LoggerError(log::SetLoggerError),
    Http(reqwest::Error),
    Json(serde_json::Error),
    Snapshot(String),
    Protocol(String),
    Config(String),
    Parse(String),
}

/// A specific custom `Result` for all functions
pub type IRRResult<T> = Result<T, IRRError>;

// All convertion for internal errors for IRRError
impl From<io::Error> for IRRError {
    fn from(err: io::Error) -> Self {
        IRRError::Io(err)
    }
}

impl From<std::string::FromUtf8Error> for IRRError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        IRRError::FromUtf8(err)
    }
}

impl From<ParseIntError> for IRRError {
    fn from(err: ParseIntError) -> Self {
        IRRError::ParseInt(err)
    }
}

impl From<log::SetLoggerError> for IRRError {
    fn from(err: log::SetLoggerError) -> Self {
        IRRError::LoggerError(err)
    }
}

impl From<reqwest::Error> for IRRError {
    fn from(err: reqwest::Error) -> Self {
        IRRError::Http(err)
    }
}

impl From<serde_json::Error> for IRRError {
    fn from(err: serde_json::Error) -> Self {
        IRRError::Json(err)
    }
}
