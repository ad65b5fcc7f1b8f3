use std::error::Error as StdError;
use std::io;

use super::helpers::TimedOut;
use super::types::{Error, Kind};

impl Error {
    /// Returns true if a CAS update ran out of retries.
    #[must_use]
    pub fn is_storage_contention(&self) -> bool {
        matches!(self.inner.kind, Kind::StorageContention { .. })
    }

    /// Returns true if the storage backend failed.
    #[must_use]
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(self.inner.kind, Kind::StorageUnavailable)
    }

    /// Returns true for any storage-side failure, which the cache degrades around.
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(
            self.inner.kind,
            Kind::StorageContention { .. } | Kind::StorageUnavailable | Kind::MalformedEntry
        )
    }

    /// Returns true if a stored entry failed structural validation.
    #[must_use]
    pub fn is_malformed_entry(&self) -> bool {
        matches!(self.inner.kind, Kind::MalformedEntry)
    }

    /// Returns true if the transport failed.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self.inner.kind, Kind::Transport)
    }

    /// Returns true if the error is related to a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        if matches!(self.inner.kind, Kind::Timeout) {
            return true;
        }

        let mut source = self.source();

        while let Some(err) = source {
            if err.is::<TimedOut>() {
                return true;
            }
            if let Some(io) = err.downcast_ref::<io::Error>() {
                if io.kind() == io::ErrorKind::TimedOut {
                    return true;
                }
            }
            source = err.source();
        }

        false
    }

    /// Returns true if the configuration was rejected.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self.inner.kind, Kind::Config)
    }
}
