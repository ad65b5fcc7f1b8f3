use super::types::{Error, Kind};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Creates an `Error` for an exhausted CAS retry budget.
pub fn storage_contention(attempts: u32) -> Error {
    Error::new(Kind::StorageContention { attempts })
}

/// Creates an `Error` for a backend I/O failure.
pub fn storage_unavailable<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::StorageUnavailable).with(e.into())
}

/// Creates an `Error` for a stored entry that failed validation.
pub fn malformed_entry<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::MalformedEntry).with(e.into())
}

/// Creates an `Error` for a transport failure.
pub fn transport<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Transport).with(e.into())
}

/// Creates an `Error` for an elapsed end-to-end timeout.
pub fn timeout() -> Error {
    Error::new(Kind::Timeout).with(super::helpers::TimedOut)
}

/// Creates an `Error` for invalid configuration.
pub fn config<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Config).with(e.into())
}
