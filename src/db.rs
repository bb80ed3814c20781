//! Consumed interfaces: the on-disk persistence layers for OCSP responses,
//! HPKP pins, and TLS session tickets are out of scope (spec §1). Only
//! their query/update contracts are defined here, as traits this crate
//! calls into — ownership and persistence are the caller's problem.

use std::time::SystemTime;

/// A previously-negotiated TLS session, serialized by the provider and
/// keyed by hostname (spec §3 "Persisted TLS Session Entry").
#[derive(Debug, Clone)]
pub struct TlsSessionEntry {
    pub hostname: String,
    pub expiry: SystemTime,
    pub session: Vec<u8>,
}

/// The TLS session resumption cache (component D's collaborator).
pub trait TlsSessionDb: Send + Sync {
    /// Look up a cached session for `hostname`. Absence is not an error.
    fn get(&self, hostname: &str) -> Option<TlsSessionEntry>;

    /// Persist (or replace) the session for `hostname`.
    fn add(&self, entry: TlsSessionEntry);
}

/// Outcome of an OCSP cache lookup, keyed by a CertID-derived cache key.
#[derive(Debug, Clone)]
pub struct OcspEntry {
    pub fingerprint: String,
    pub valid: bool,
    pub expiry: SystemTime,
}

/// The OCSP response cache (spec §3: `ocsp_cert_cache`/`ocsp_host_cache`).
///
/// The engine consults this to avoid re-querying an OCSP responder for a
/// certificate it has already checked recently; it is not required for
/// correctness (a cache miss just means "go ask the responder").
pub trait OcspDb: Send + Sync {
    fn get(&self, fingerprint: &str) -> Option<OcspEntry>;
    fn add(&self, entry: OcspEntry);
}

/// Outcome of an HPKP pin lookup for a given `(hostname, spki)` pair
/// (spec §3/§4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMatch {
    /// The SPKI matches a pin recorded for this host.
    Match,
    /// No pins are recorded for this host at all.
    NoPinsForHost,
    /// Pins are recorded for this host, but none match this SPKI.
    Mismatch,
    /// The lookup itself failed (treated as a degraded pass, per spec).
    LookupFailed,
}

/// The HPKP pin database (component E's HPKP collaborator).
pub trait HpkpDb: Send + Sync {
    /// Check whether `spki` (a DER-encoded SubjectPublicKeyInfo) matches
    /// a pin recorded for `hostname`.
    fn check_pubkey(&self, hostname: &str, spki: &[u8]) -> PinMatch;
}
