//! Transport collaborator - the origin-facing side of the cache
//!
//! The orchestrator hands every request that cannot be answered from storage
//! to a transport. Implementations encapsulate connection handling, protocol
//! negotiation and body collection; the cache only sees a fully materialized
//! response or a transport error.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use http::{HeaderMap, Uri, header::HOST};

use crate::error::{self, Result};
use crate::http::{HttpRequest, HttpResponse, headers::first_str};

/// Origin a request is routed to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
}

impl Target {
    /// Derive the target from an absolute URI, falling back to `Host`
    ///
    /// # Errors
    ///
    /// Returns a transport error when neither the URI nor `Host` names an origin.
    pub fn from_request(request: &HttpRequest) -> Result<Self> {
        Self::from_parts(request.uri(), request.headers())
    }

    fn from_parts(uri: &Uri, headers: &HeaderMap) -> Result<Self> {
        if let Some(authority) = uri.authority() {
            return Ok(Self {
                scheme: uri.scheme_str().unwrap_or("http").to_ascii_lowercase(),
                host: authority.host().to_ascii_lowercase(),
                port: authority.port_u16(),
            });
        }

        let host = first_str(headers, HOST)
            .ok_or_else(|| error::transport(format!("request {uri} has no target host")))?;
        let authority: http::uri::Authority = host
            .parse()
            .map_err(|e| error::transport(e).with_key(uri))?;
        Ok(Self {
            scheme: "http".to_string(),
            host: authority.host().to_ascii_lowercase(),
            port: authority.port_u16(),
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        Ok(())
    }
}

/// Blocking transport
pub trait Transport: Send + Sync {
    /// Execute `request` against `target`
    ///
    /// # Errors
    ///
    /// Returns a transport error when no response could be obtained.
    fn execute(&self, target: &Target, request: HttpRequest) -> Result<HttpResponse>;
}

/// Non-blocking transport; dropping the returned future cancels the call
pub trait AsyncTransport: Send + Sync {
    fn execute(
        &self,
        target: &Target,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse>> + Send;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn execute(&self, target: &Target, request: HttpRequest) -> Result<HttpResponse> {
        (**self).execute(target, request)
    }
}

impl<T: AsyncTransport> AsyncTransport for Arc<T> {
    fn execute(
        &self,
        target: &Target,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse>> + Send {
        (**self).execute(target, request)
    }
}
