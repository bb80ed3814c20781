//! Component C — maps a symbolic priority string to a provider
//! min/max TLS version and cipher list (spec §4.C).

use boring::ssl::{SslConnectorBuilder, SslVersion};

use crate::error::Result;

const DEFAULT_CIPHERS: &str = "HIGH:!aNULL:!RC4:!MD5:!SRP:!PSK";
const PFS_CIPHERS: &str = "HIGH:!aNULL:!RC4:!MD5:!SRP:!PSK:!kRSA";

/// Applies the priority string's min/max version and cipher list onto a
/// connector builder. A failure to set the cipher list is fatal to init
/// (`INVALID_PRIORITY` in spec terms), surfaced via `EngineError::Unknown`
/// to the caller, who sees `init()` fail.
pub(crate) fn apply_priority(builder: &mut SslConnectorBuilder, priority: &str) -> Result<()> {
    builder.set_min_proto_version(Some(SslVersion::TLS1_2))?;
    builder.set_max_proto_version(None)?;

    let ciphers = if priority.eq_ignore_ascii_case("ssl") {
        builder.set_min_proto_version(Some(SslVersion::SSL3))?;
        DEFAULT_CIPHERS
    } else if priority.eq_ignore_ascii_case("tlsv1") {
        builder.set_min_proto_version(Some(SslVersion::TLS1))?;
        DEFAULT_CIPHERS
    } else if priority.eq_ignore_ascii_case("tlsv1_1") {
        builder.set_min_proto_version(Some(SslVersion::TLS1_1))?;
        DEFAULT_CIPHERS
    } else if priority.eq_ignore_ascii_case("tlsv1_3") {
        if builder.set_min_proto_version(Some(SslVersion::TLS1_3)).is_err() {
            log::info!("provider does not support TLS 1.3; staying at TLS 1.2");
            builder.set_min_proto_version(Some(SslVersion::TLS1_2))?;
        }
        DEFAULT_CIPHERS
    } else if priority.eq_ignore_ascii_case("pfs") {
        PFS_CIPHERS
    } else if priority.is_empty()
        || priority.eq_ignore_ascii_case("auto")
        || priority.eq_ignore_ascii_case("tlsv1_2")
    {
        DEFAULT_CIPHERS
    } else {
        // Any other non-empty string is a provider-specific priority
        // string, passed through verbatim.
        priority
    };

    if builder.set_cipher_list(ciphers).is_err() {
        log::error!("invalid priority string '{priority}'");
        return Err(crate::error::EngineError::Invalid);
    }

    Ok(())
}

/// Applies the config's comma-separated ALPN protocol list (spec §3
/// `alpn`), encoding it into the length-prefixed wire form BoringSSL's
/// `set_alpn_protos` expects. A malformed entry (one that can't be
/// length-prefixed, i.e. longer than 255 bytes) is logged and the whole
/// list is dropped rather than sending a truncated one.
pub(crate) fn apply_alpn(builder: &mut SslConnectorBuilder, alpn: Option<&str>) {
    let alpn = match alpn {
        Some(s) if !s.is_empty() => s,
        _ => return,
    };

    let mut wire = Vec::new();
    for proto in alpn.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if proto.len() > 255 {
            log::error!("ALPN protocol '{proto}' exceeds 255 bytes; dropping ALPN configuration");
            return;
        }
        wire.push(proto.len() as u8);
        wire.extend_from_slice(proto.as_bytes());
    }

    if wire.is_empty() {
        return;
    }

    if let Err(e) = builder.set_alpn_protos(&wire) {
        log::error!("could not set ALPN protocols '{alpn}': {e}");
    }
}
