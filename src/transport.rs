//! The HTTP delivery mechanism for OCSP requests (spec §6 consumed
//! interface: `http_get(url, headers, max_redirects, connection_ptr)`).
//!
//! This crate is itself a blocking, readiness-polled engine with no
//! async runtime (spec §5), so the default transport is a synchronous
//! HTTP client rather than pulling in hyper/tokio for one POST.

use std::io::Read;
use std::time::Duration;

use crate::error::{EngineError, Result};

const MAX_REDIRECTS: u32 = 5;

/// Delivers an OCSP request over HTTP and returns the raw DER response
/// body. An external collaborator per spec §6 — this crate only
/// specifies the contract and a default implementation.
pub trait OcspTransport: Send + Sync {
    fn post(&self, url: &str, body: &[u8]) -> Result<Vec<u8>>;
}

/// Default [`OcspTransport`] built on `ureq`.
pub struct UreqOcspTransport {
    agent: ureq::Agent,
}

impl Default for UreqOcspTransport {
    fn default() -> Self {
        UreqOcspTransport {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(10))
                .redirects(MAX_REDIRECTS)
                .build(),
        }
    }
}

impl OcspTransport for UreqOcspTransport {
    fn post(&self, url: &str, body: &[u8]) -> Result<Vec<u8>> {
        let response = self
            .agent
            .post(url)
            .set("Content-Type", "application/ocsp-request")
            .set("Accept", "*/*")
            .set("Accept-Encoding", "identity")
            .send_bytes(body)
            .map_err(|e| {
                log::debug!("OCSP request to '{url}' failed: {e}");
                EngineError::Unknown
            })?;

        let mut buf = Vec::new();
        response
            .into_reader()
            .take(1024 * 1024)
            .read_to_end(&mut buf)
            .map_err(EngineError::from)?;
        Ok(buf)
    }
}
