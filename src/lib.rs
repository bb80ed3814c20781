//! A TLS client engine: handshake orchestration, trust-store loading,
//! OCSP revocation checking, HPKP pinning, and session resumption over
//! BoringSSL.
//!
//! The engine owns no async runtime and never blocks a caller's thread
//! on its own: every point where a real handshake or transfer would
//! otherwise block goes through a caller-supplied [`poll::ReadinessPoll`]
//! instead. Persistence (OCSP responses, HPKP pins, TLS session tickets)
//! is likewise the caller's responsibility, expressed as the
//! [`db::OcspDb`]/[`db::HpkpDb`]/[`db::TlsSessionDb`] traits.
//!
//! Building with the default `boring-tls` feature gets the real engine;
//! disabling it falls back to a no-op build where every operation
//! returns [`error::EngineError::TlsDisabled`] instead of failing to link.

mod config;
mod db;
mod error;
mod poll;
mod transport;

#[cfg(feature = "boring-tls")]
mod engine;
#[cfg(feature = "boring-tls")]
mod orchestrator;
#[cfg(feature = "boring-tls")]
mod priority;
#[cfg(feature = "boring-tls")]
mod revocation;
#[cfg(feature = "boring-tls")]
mod session_cache;
#[cfg(feature = "boring-tls")]
mod trust;

#[cfg(not(feature = "boring-tls"))]
mod unsupported;

pub use config::{Config, ConfigKey, ConfigObject, X509Format};
pub use db::{HpkpDb, OcspDb, OcspEntry, PinMatch, TlsSessionDb, TlsSessionEntry};
pub use error::{EngineError, Result};
pub use poll::{Interest, PollFd, PollOutcome, ReadinessPoll};
pub use transport::{OcspTransport, UreqOcspTransport};

#[cfg(feature = "boring-tls")]
pub use engine::{Engine, GlobalEngine};
#[cfg(feature = "boring-tls")]
pub use orchestrator::{State, TlsSession};

#[cfg(not(feature = "boring-tls"))]
pub use unsupported::{Engine, GlobalEngine, TlsSession};
