use std::error::Error as StdError;
use std::fmt;

/// A Result alias where the Err case is `quyc_cache::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the caching layer and its collaborators.
pub struct Error {
    pub inner: Box<Inner>,
}

pub struct Inner {
    pub kind: Kind,
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    /// Cache key or URI the error relates to, rendered for diagnostics
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    /// CAS retry budget exhausted while updating an entry
    StorageContention { attempts: u32 },
    /// Backend I/O failure on get/put/remove
    StorageUnavailable,
    /// Stored entry failed structural validation
    MalformedEntry,
    /// The transport collaborator failed to produce a response
    Transport,
    /// The orchestrated request exceeded its end-to-end timeout
    Timeout,
    /// Invalid configuration or builder input
    Config,
}

impl Error {
    pub fn new(kind: Kind) -> Error {
        Error {
            inner: Box::new(Inner {
                kind,
                source: None,
                key: None,
            }),
        }
    }

    #[must_use = "Error builder methods return a new Error and should be used"]
    pub fn with<E: Into<Box<dyn StdError + Send + Sync>>>(mut self, source: E) -> Error {
        self.inner.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn with_key(mut self, key: impl fmt::Display) -> Self {
        self.inner.key = Some(key.to_string());
        self
    }

    #[must_use]
    pub fn kind(&self) -> &Kind {
        &self.inner.kind
    }

    /// Get the cache key or URI associated with this error, if any
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.inner.key.as_deref()
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("quyc_cache::Error");

        f.field("kind", &self.inner.kind);

        if let Some(ref source) = self.inner.source {
            f.field("source", source);
        }

        if let Some(ref key) = self.inner.key {
            f.field("key", key);
        }

        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.kind {
            Kind::StorageContention { attempts } => {
                write!(f, "cache entry update lost to concurrent writers after {attempts} attempts")
            }
            Kind::StorageUnavailable => f.write_str("cache storage unavailable"),
            Kind::MalformedEntry => f.write_str("malformed cache entry"),
            Kind::Transport => f.write_str("transport failure"),
            Kind::Timeout => f.write_str("request timeout"),
            Kind::Config => f.write_str("invalid cache configuration"),
        }?;

        if let Some(ref key) = self.inner.key {
            write!(f, " for {key}")?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .source
            .as_ref()
            .map(|err| &**err as &(dyn StdError + 'static))
    }
}
