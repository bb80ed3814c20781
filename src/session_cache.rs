//! Component D — serializes/deserializes TLS session blobs against the
//! session DB, keyed by hostname (spec §4.D).

use std::time::{Duration, SystemTime};

use boring::ssl::{ConnectConfiguration, SslRef, SslSession};

use crate::db::{TlsSessionDb, TlsSessionEntry};

/// Sessions are considered valid for 18 hours from the moment they're
/// saved (spec §3 "Persisted TLS Session Entry").
const SESSION_TTL: Duration = Duration::from_secs(18 * 3600);

/// Outcome of a resumption attempt. Absence of a cache or of an entry is
/// `Resumed(false)` with no error — resumption is always best-effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resumed {
    Yes,
    No,
}

/// Looks up `hostname` in `db` and, if a usable session is found,
/// installs it into `cfg` ahead of the handshake. A present-but-broken
/// entry (undecodable, or not marked resumable) never fails the
/// handshake — it just falls back to a full handshake, per spec.
pub(crate) fn resume(
    cfg: &mut ConnectConfiguration,
    hostname: &str,
    db: Option<&dyn TlsSessionDb>,
) -> Resumed {
    let db = match db {
        Some(db) => db,
        None => return Resumed::No,
    };

    let entry = match db.get(hostname) {
        Some(entry) => entry,
        None => return Resumed::No,
    };

    let session = match SslSession::from_der(&entry.session) {
        Ok(session) => session,
        Err(e) => {
            log::debug!("could not decode cached TLS session for '{hostname}': {e}");
            return Resumed::No;
        }
    };

    if !session.is_resumable() {
        log::debug!("cached TLS session for '{hostname}' is not resumable");
        return Resumed::No;
    }

    // SAFETY: `session` was produced by this same provider (BoringSSL) for
    // a connection to this same hostname, via `SslSession::to_der` in
    // `save` below — the precondition `set_session` documents.
    match unsafe { cfg.set_session(&session) } {
        Ok(()) => Resumed::Yes,
        Err(e) => {
            log::debug!("could not install cached TLS session for '{hostname}': {e}");
            Resumed::No
        }
    }
}

/// After a successful handshake, serializes the negotiated session (if
/// any) and submits it to `db` with an 18-hour expiry. Silently does
/// nothing if there's no session to save or no cache configured.
pub(crate) fn save(ssl: &SslRef, hostname: &str, db: Option<&dyn TlsSessionDb>) {
    let db = match db {
        Some(db) => db,
        None => return,
    };

    let session = match ssl.session() {
        Some(session) => session,
        None => return,
    };

    let blob = match session.to_der() {
        Ok(blob) => blob,
        Err(e) => {
            log::debug!("could not serialize TLS session for '{hostname}': {e}");
            return;
        }
    };

    db.add(TlsSessionEntry {
        hostname: hostname.to_string(),
        expiry: SystemTime::now() + SESSION_TTL,
        session: blob,
    });
}
