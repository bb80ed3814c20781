//! Component B — populates the provider's trust store from a "system"
//! sentinel, a directory of PEM files, a single CA file, and/or a CRL
//! (spec §4.B).

use std::path::Path;

use boring::ssl::{SslConnectorBuilder, SslFiletype};
use boring::x509::store::X509StoreFlags;
use boring::x509::{X509Crl, X509};

use crate::config::{Config, X509Format};
use crate::error::{EngineError, Result};

/// Loads trust material into `builder` per `config`. Soft failures (no
/// `.pem` files found, `ca_file` missing) are logged and swallowed; only
/// CRL load failure is fatal to `init()` (spec §4.B/§7).
///
/// Does not touch the builder's verify mode/callback — that's
/// [`crate::revocation::install_callback`]'s job, as the single place
/// that decides the final `SSL_CTX_set_verify` mode (spec §4.B step 5),
/// so this function and that one never race to clobber each other's
/// setting.
pub(crate) fn load_trust(builder: &mut SslConnectorBuilder, config: &Config) -> Result<()> {
    if !config.check_certificate {
        log::warn!("certificate verification is disabled");
        return Ok(());
    }

    let dir = config.ca_directory().unwrap_or("system");

    if dir == "system" {
        if builder.set_default_verify_paths().is_err() {
            log::info!("could not load system trust paths; falling back to a directory scan of '{dir}'");
            scan_directory(builder, dir);
        }
    } else {
        scan_directory(builder, dir);
    }

    if let Some(ca_file) = &config.ca_file {
        if let Err(e) = load_ca_file(builder, ca_file, config.ca_type) {
            log::error!("could not load ca_file '{}': {e}", ca_file.display());
        }
    }

    if let Some(crl_file) = &config.crl_file {
        load_crl(builder, crl_file).map_err(|e| {
            log::error!("could not load CRL from '{}': {e}", crl_file.display());
            EngineError::Unknown
        })?;
    }

    load_client_identity(builder, config);

    Ok(())
}

/// Loads the client's own certificate (chain) and private key for mutual
/// TLS, if configured (spec §3 `cert_file`/`key_file`/`cert_type`/
/// `key_type`). Neither is required for a plain client connection, so a
/// failure here is logged and non-fatal, matching the soft-failure
/// treatment the rest of this loader gives `ca_file`.
fn load_client_identity(builder: &mut SslConnectorBuilder, config: &Config) {
    if let Some(cert_file) = &config.cert_file {
        let result = match config.cert_type {
            X509Format::Pem => builder.set_certificate_chain_file(cert_file),
            X509Format::Der => builder.set_certificate_file(cert_file, SslFiletype::DER),
        };
        if let Err(e) = result {
            log::error!("could not load cert_file '{}': {e}", cert_file.display());
        }
    }

    if let Some(key_file) = &config.key_file {
        let filetype = filetype_of(config.key_type);
        if let Err(e) = builder.set_private_key_file(key_file, filetype) {
            log::error!("could not load key_file '{}': {e}", key_file.display());
        }
    }
}

fn filetype_of(format: X509Format) -> SslFiletype {
    match format {
        X509Format::Pem => SslFiletype::PEM,
        X509Format::Der => SslFiletype::DER,
    }
}

/// Scans `dir` for `.pem` files and reports the outcome (spec §4.B step 2:
/// "zero successes on a user-specified directory is an error... but not
/// fatal"). Shared by the `ca_directory="system"` fallback and the plain
/// directory case — both end up running the exact same scan.
fn scan_directory(builder: &mut SslConnectorBuilder, dir: &str) {
    match load_pem_directory(builder, dir) {
        Ok(0) => log::error!("no certificates could be loaded from directory '{dir}'"),
        Ok(n) => log::debug!("loaded {n} certificates from '{dir}'"),
        Err(_) => log::error!("could not open directory '{dir}'; no certificates were loaded"),
    }
}

/// Iterates `dir`'s entries, loading every regular file whose name ends
/// (ASCII, case-insensitive) in `.pem`. Files that fail to parse are
/// skipped silently (debug log only) rather than aborting the scan — the
/// spec explicitly calls out that a prefix-match here is a known bug in
/// one source variant; this is a suffix match using `Path::join`, which
/// cannot reproduce the truncating-separator bug either.
fn load_pem_directory(builder: &mut SslConnectorBuilder, dir: &str) -> std::io::Result<usize> {
    let mut loaded = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let path = entry.path();
        let is_pem = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_ascii_lowercase().ends_with(".pem"))
            .unwrap_or(false);
        if !is_pem {
            continue;
        }
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }

        match load_ca_file(builder, &path, X509Format::Pem) {
            Ok(()) => loaded += 1,
            Err(e) => log::debug!("skipping '{}': {e}", path.display()),
        }
    }
    Ok(loaded)
}

/// Loads one or more CA certificates from `path` into the trust store,
/// decoding as `format` (spec §3 `ca_type`). The directory scan always
/// passes `X509Format::Pem` — only `.pem` files are scanned there by
/// spec §4.B — so the `Der` branch only ever fires for `config.ca_file`.
fn load_ca_file(builder: &mut SslConnectorBuilder, path: &Path, format: X509Format) -> Result<()> {
    let bytes = std::fs::read(path)?;
    let certs = match format {
        X509Format::Pem => X509::stack_from_pem(&bytes)?,
        X509Format::Der => vec![X509::from_der(&bytes)?],
    };
    if certs.is_empty() {
        return Err(EngineError::InvalidCert);
    }
    let store = builder.cert_store_mut();
    for cert in certs {
        store.add_cert(cert)?;
    }
    Ok(())
}

fn load_crl(builder: &mut SslConnectorBuilder, path: &Path) -> Result<()> {
    let pem = std::fs::read(path)?;
    let crl = X509Crl::from_pem(&pem)?;
    let store = builder.cert_store_mut();
    store.add_crl(crl)?;
    store.set_flags(X509StoreFlags::CRL_CHECK_ALL | X509StoreFlags::USE_DELTAS)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use boring::ssl::{SslConnector, SslMethod};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn builder() -> SslConnectorBuilder {
        SslConnector::builder(SslMethod::tls_client()).unwrap()
    }

    fn self_signed_pem() -> String {
        rcgen::generate_simple_self_signed(vec!["example.invalid".to_string()])
            .unwrap()
            .cert
            .pem()
    }

    /// Unique scratch directory per test, cleaned up on drop; avoids
    /// pulling in a `tempfile` dependency the teacher doesn't use.
    struct ScratchDir(std::path::PathBuf);

    impl ScratchDir {
        fn new() -> Self {
            static COUNTER: AtomicU32 = AtomicU32::new(0);
            let n = COUNTER.fetch_add(1, Ordering::Relaxed);
            let dir = std::env::temp_dir().join(format!(
                "tlsengine-trust-test-{}-{n}",
                std::process::id()
            ));
            std::fs::create_dir_all(&dir).unwrap();
            ScratchDir(dir)
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn loads_only_suffix_matched_pem_files() {
        let dir = ScratchDir::new();
        std::fs::write(dir.0.join("ca1.pem"), self_signed_pem()).unwrap();
        std::fs::write(dir.0.join("CA2.PEM"), self_signed_pem()).unwrap();
        std::fs::write(dir.0.join("notes.txt"), "not a certificate").unwrap();
        // A filename that *starts* with "pem" but doesn't end in ".pem"
        // would be a false positive under the prefix-match bug spec §4.B
        // calls out; this must not be picked up.
        std::fs::write(dir.0.join("pem.bak"), self_signed_pem()).unwrap();

        let mut b = builder();
        let loaded = load_pem_directory(&mut b, dir.0.to_str().unwrap()).unwrap();
        assert_eq!(loaded, 2, "only the two *.pem files (case-insensitive) load");
    }

    #[test]
    fn garbage_pem_file_is_skipped_not_fatal() {
        let dir = ScratchDir::new();
        std::fs::write(dir.0.join("good.pem"), self_signed_pem()).unwrap();
        std::fs::write(dir.0.join("bad.pem"), "not a pem file at all").unwrap();

        let mut b = builder();
        let loaded = load_pem_directory(&mut b, dir.0.to_str().unwrap()).unwrap();
        assert_eq!(loaded, 1);
    }

    #[test]
    fn empty_directory_loads_zero() {
        let dir = ScratchDir::new();
        let mut b = builder();
        let loaded = load_pem_directory(&mut b, dir.0.to_str().unwrap()).unwrap();
        assert_eq!(loaded, 0);
    }

    #[test]
    fn check_certificate_false_disables_verification() {
        let mut b = builder();
        let mut config = Config::default();
        config.check_certificate = false;
        assert!(load_trust(&mut b, &config).is_ok());
    }

    #[test]
    fn crl_load_failure_is_fatal() {
        let dir = ScratchDir::new();
        let bad_crl = dir.0.join("bad.crl");
        std::fs::write(&bad_crl, "not a crl").unwrap();

        let mut b = builder();
        let mut config = Config::default();
        config.ca_directory = Some("system".to_string());
        config.crl_file = Some(bad_crl);
        assert!(load_trust(&mut b, &config).is_err());
    }

    #[test]
    fn client_identity_loads_cert_and_key_for_mutual_tls() {
        let dir = ScratchDir::new();
        let certified =
            rcgen::generate_simple_self_signed(vec!["client.invalid".to_string()]).unwrap();
        let cert_path = dir.0.join("client.pem");
        let key_path = dir.0.join("client-key.pem");
        std::fs::write(&cert_path, certified.cert.pem()).unwrap();
        std::fs::write(&key_path, certified.key_pair.serialize_pem()).unwrap();

        let mut b = builder();
        let mut config = Config::default();
        config.check_certificate = false;
        config.cert_file = Some(cert_path);
        config.key_file = Some(key_path);
        assert!(load_trust(&mut b, &config).is_ok());
    }

    #[test]
    fn der_ca_file_loads_when_ca_type_is_der() {
        let dir = ScratchDir::new();
        let cert = rcgen::generate_simple_self_signed(vec!["ca.invalid".to_string()]).unwrap();
        let ca_path = dir.0.join("ca.der");
        std::fs::write(&ca_path, cert.cert.der()).unwrap();

        let mut b = builder();
        let mut config = Config::default();
        config.ca_directory = Some("system".to_string());
        config.ca_file = Some(ca_path);
        config.ca_type = X509Format::Der;
        assert!(load_trust(&mut b, &config).is_ok());
    }

    #[test]
    fn pem_ca_file_fails_to_load_as_der() {
        let dir = ScratchDir::new();
        let ca_path = dir.0.join("ca.pem");
        std::fs::write(&ca_path, self_signed_pem()).unwrap();

        let mut b = builder();
        assert!(load_ca_file(&mut b, &ca_path, X509Format::Der).is_err());
    }

    #[test]
    fn missing_client_key_file_is_logged_not_fatal() {
        let dir = ScratchDir::new();
        let mut b = builder();
        let mut config = Config::default();
        config.check_certificate = false;
        config.key_file = Some(dir.0.join("does-not-exist.pem"));
        assert!(load_trust(&mut b, &config).is_ok());
    }
}
