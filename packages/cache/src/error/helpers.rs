use std::fmt;

/// A marker type to indicate that the orchestrated request timed out.
#[derive(Debug)]
pub struct TimedOut;

impl fmt::Display for TimedOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("timed out")
    }
}

impl std::error::Error for TimedOut {}

/// A marker type to indicate that a storage operation panicked.
#[derive(Debug)]
pub struct StoragePanicked(pub String);

impl fmt::Display for StoragePanicked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "storage operation panicked: {}", self.0)
    }
}

impl std::error::Error for StoragePanicked {}
