//! Download URL splitting.
//!
//! `scheme://host/resource?query` → [`ImageLocation`].  The resource keeps
//! its leading `/` and the full query string; pre-signed object-store URLs
//! carry their credentials there.

use crate::error::OtaError;

/// Longest URL accepted in an OTA directive.
pub const MAX_URL_LEN: usize = 2000;
pub const HOST_LEN: usize = 128;
pub const RESOURCE_LEN: usize = 2048;

/// Where to fetch an image from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLocation {
    pub host: heapless::String<HOST_LEN>,
    pub resource: heapless::String<RESOURCE_LEN>,
}

impl ImageLocation {
    /// Split `url` into host and resource.
    ///
    /// Needs at least three `/` separators: two after the scheme and one
    /// starting the resource.
    pub fn parse(url: &str) -> Result<Self, OtaError> {
        if url.len() > MAX_URL_LEN {
            return Err(OtaError::InvalidUrl("URL too long"));
        }
        let (scheme, rest) = url
            .split_once("://")
            .ok_or(OtaError::InvalidUrl("missing scheme separator"))?;
        if scheme.is_empty() {
            return Err(OtaError::InvalidUrl("empty scheme"));
        }
        let slash = rest
            .find('/')
            .ok_or(OtaError::InvalidUrl("missing resource path"))?;
        let (host, resource) = rest.split_at(slash);
        if host.is_empty() {
            return Err(OtaError::InvalidUrl("empty host"));
        }

        let host = heapless::String::try_from(host)
            .map_err(|_| OtaError::InvalidUrl("host too long"))?;
        let resource = heapless::String::try_from(resource)
            .map_err(|_| OtaError::InvalidUrl("resource too long"))?;
        Ok(Self { host, resource })
    }
}
