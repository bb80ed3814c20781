//! Component E — the revocation callback: wires OCSP and HPKP checking
//! into BoringSSL's certificate-verification hook (spec §4.E).
//!
//! The verify callback only has access to whatever BoringSSL smuggles
//! through `X509StoreContextRef`; the per-connection hostname is carried
//! separately via the `Ssl`'s own ex-data slot (spec §5 "ex-data
//! smuggling"), set by the orchestrator right before `connect()`.

mod hpkp;
mod ocsp;

use std::sync::Arc;

use boring::ex_data::Index;
use boring::ssl::{Ssl, SslContextBuilder, SslRef, SslVerifyMode};
use boring::x509::store::X509StoreContextRef;
use boring::x509::X509;
use foreign_types::ForeignTypeRef;
use once_cell::sync::OnceCell;

use crate::config::Config;
use crate::transport::OcspTransport;

/// Per-connection state the callback needs but which BoringSSL's own
/// verify-callback signature doesn't carry: the hostname being
/// connected to (for OCSP responder fallback URLs and HPKP lookups) plus
/// the config/transport the orchestrator resolved this connection with.
pub(crate) struct ConnContext {
    pub(crate) hostname: String,
    pub(crate) config: Arc<Config>,
    pub(crate) transport: Arc<dyn OcspTransport>,
}

static CONN_INDEX: OnceCell<Index<Ssl, ConnContext>> = OnceCell::new();

fn conn_index() -> Index<Ssl, ConnContext> {
    *CONN_INDEX.get_or_init(|| Ssl::new_ex_index().expect("ex_data index exhausted"))
}

/// Stashes `ctx` on `ssl` so the verify callback installed by
/// [`install_callback`] can retrieve it later in the handshake.
pub(crate) fn attach(ssl: &mut SslRef, ctx: ConnContext) {
    ssl.set_ex_data(conn_index(), ctx);
}

/// Installs the combined OCSP + HPKP verify callback on `builder`, and is
/// the single place that decides the final verify *mode* too (spec §4.B
/// step 5 / §4.E) — `SSL_CTX_set_verify` takes mode and callback together,
/// so splitting the mode decision into a separate call site elsewhere
/// (e.g. the trust loader) would race against this one to decide the
/// mode, and whichever ran last would silently win. Must be called once
/// per `SslContextBuilder`/`SslConnectorBuilder`, before any connection
/// using it calls [`attach`].
pub(crate) fn install_callback(builder: &mut SslContextBuilder, config: &Config) {
    let mode = if config.check_certificate {
        SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT
    } else {
        SslVerifyMode::NONE
    };
    builder.set_verify_callback(mode, |preverify_ok, store_ctx| {
        if !preverify_ok {
            return false;
        }
        // Only the final callback invocation (depth 0, the full chain
        // already built) has a complete chain to reason about.
        if store_ctx.error_depth() != 0 {
            return true;
        }
        verify_chain(store_ctx)
    });
}

fn verify_chain(store_ctx: &mut X509StoreContextRef) -> bool {
    let chain: Vec<X509> = match store_ctx.chain() {
        Some(chain) => chain.iter().map(|c| c.to_owned()).collect(),
        None => return false,
    };
    if chain.is_empty() {
        return false;
    }

    let ssl_idx = match X509StoreContextRef::ssl_idx() {
        Ok(idx) => idx,
        Err(_) => return false,
    };
    let ssl = match store_ctx.ex_data(ssl_idx) {
        Some(ssl) => ssl,
        None => {
            log::error!("verify callback ran without an associated Ssl; rejecting");
            return false;
        }
    };
    let conn = match ssl.ex_data(conn_index()) {
        Some(conn) => conn,
        None => {
            log::error!("verify callback ran without connection context; rejecting");
            return false;
        }
    };

    let ocsp_ok = if conn.config.ocsp {
        ocsp::check_chain(&chain, &conn.config, conn.transport.as_ref())
    } else {
        true
    };
    if !ocsp_ok {
        log::warn!("OCSP revocation check failed for '{}'", conn.hostname);
        return false;
    }

    let hpkp_ok = match &conn.config.hpkp_cache {
        Some(db) => hpkp::check_chain(&chain, &conn.hostname, db.as_ref()),
        None => true,
    };
    if !hpkp_ok {
        log::warn!("HPKP pin check failed for '{}'", conn.hostname);
        return false;
    }

    true
}
