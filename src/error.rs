use thiserror::Error;

/// Failure of a call to the archive backend.
///
/// Every variant is recoverable: callers keep their last good state and
/// surface the message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
  #[error("could not reach the archive server: {0}")]
  Transport(String),
  #[error("server answered {status}: {message}")]
  Status { status: u16, message: String },
  #[error("unexpected response from server: {0}")]
  Decode(String),
  /// Business error reported by the backend, shown verbatim.
  #[error("{0}")]
  Backend(String),
}

impl From<reqwest::Error> for ApiError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() { ApiError::Decode(e.to_string()) } else { ApiError::Transport(e.to_string()) }
  }
}

/// Rejected user input; raised before any request is sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
  #[error("duration must look like HH:MM:SS, got {0:?}")]
  Duration(String),
  #[error("cannot read {0:?} as a date (expected YYYY-MM-DD or RFC 3339)")]
  Date(String),
  #[error("{0} must not be empty")]
  Empty(&'static str),
}
