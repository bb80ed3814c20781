//! The HPKP sub-protocol (RFC 7469, spec §4.E "HPKP sub-protocol").
//!
//! Queries the configured pin database once per certificate in the
//! chain, keyed by SPKI DER, and passes iff at least one certificate in
//! the chain is not an explicit `Mismatch` — absence of any pins for the
//! host, or a lookup failure, is never by itself a hard failure (spec
//! §4.E invariant: "a host with no configured pins always passes").

use boring::x509::X509;

use crate::db::{HpkpDb, PinMatch};

pub(crate) fn check_chain(chain: &[X509], hostname: &str, db: &dyn HpkpDb) -> bool {
    if chain.is_empty() {
        return true;
    }

    let mut saw_no_pins = false;
    let mut saw_lookup_failure = false;

    for cert in chain {
        let spki = match cert.public_key().and_then(|k| k.public_key_to_der()) {
            Ok(der) => der,
            Err(_) => continue,
        };

        match db.check_pubkey(hostname, &spki) {
            PinMatch::Match => return true,
            PinMatch::NoPinsForHost => saw_no_pins = true,
            PinMatch::LookupFailed => saw_lookup_failure = true,
            PinMatch::Mismatch => {}
        }
    }

    if saw_no_pins {
        return true;
    }
    if saw_lookup_failure {
        log::debug!("HPKP lookup failed for '{hostname}'; treating as pass");
        return true;
    }

    log::warn!("no certificate in the chain for '{hostname}' matched a pinned public key");
    false
}
