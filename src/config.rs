//! Component A — the typed, process-wide configuration registry.

use std::path::PathBuf;
use std::sync::Arc;

use crate::db::{HpkpDb, OcspDb, TlsSessionDb};

/// Encoding used for a certificate/key file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum X509Format {
    Pem,
    Der,
}

impl Default for X509Format {
    fn default() -> Self {
        X509Format::Pem
    }
}

/// Process-wide TLS configuration (spec §3 "Configuration (A)").
///
/// Read-only during an in-flight handshake: setters are not synchronized
/// against each other, so callers mutating a `Config` must serialize
/// those mutations themselves (spec invariant). Mutations between
/// handshakes become visible starting with the next handshake.
#[derive(Clone)]
pub struct Config {
    pub secure_protocol: String,
    pub ca_directory: Option<String>,
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub crl_file: Option<PathBuf>,
    pub ocsp_server: Option<String>,
    pub ca_type: X509Format,
    pub cert_type: X509Format,
    pub key_type: X509Format,
    pub alpn: Option<String>,
    pub check_certificate: bool,
    pub check_hostname: bool,
    pub print_info: bool,
    pub ocsp: bool,
    pub ocsp_stapling: bool,
    pub ocsp_cert_cache: Option<Arc<dyn OcspDb>>,
    pub ocsp_host_cache: Option<Arc<dyn OcspDb>>,
    pub tls_session_cache: Option<Arc<dyn TlsSessionDb>>,
    pub hpkp_cache: Option<Arc<dyn HpkpDb>>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            secure_protocol: "AUTO".to_string(),
            ca_directory: Some("system".to_string()),
            ca_file: None,
            cert_file: None,
            key_file: None,
            crl_file: None,
            ocsp_server: None,
            ca_type: X509Format::Pem,
            cert_type: X509Format::Pem,
            key_type: X509Format::Pem,
            alpn: None,
            check_certificate: true,
            check_hostname: true,
            print_info: false,
            ocsp: true,
            ocsp_stapling: true,
            ocsp_cert_cache: None,
            ocsp_host_cache: None,
            tls_session_cache: None,
            hpkp_cache: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// `ca_directory=""` is treated the same as unset (spec §8 Boundary).
    pub(crate) fn ca_directory(&self) -> Option<&str> {
        match self.ca_directory.as_deref() {
            Some("") | None => None,
            Some(dir) => Some(dir),
        }
    }
}

/// Integer key identifying a configuration option, mirroring the
/// `WGET_SSL_*` key space of the original C API. Kept around so the
/// int-keyed compatibility facade (`set_string_opt`/`set_int_opt`/
/// `set_object_opt`) has something closed to match against instead of a
/// raw, unchecked `i32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigKey {
    SecureProtocol,
    CaDirectory,
    CaFile,
    CertFile,
    KeyFile,
    CrlFile,
    OcspServer,
    Alpn,
    CaType,
    CertType,
    KeyType,
    CheckCertificate,
    CheckHostname,
    PrintInfo,
    Ocsp,
    OcspStapling,
    OcspCache,
    SessionCache,
    HpkpCache,
}

impl ConfigKey {
    /// Maps a raw integer key to a known `ConfigKey`. An unrecognized
    /// value intentionally does not produce an error type — per spec,
    /// unknown keys are logged and otherwise ignored, never fatal.
    fn from_raw(raw: i32) -> Option<ConfigKey> {
        use ConfigKey::*;
        Some(match raw {
            0 => SecureProtocol,
            1 => CaDirectory,
            2 => CaFile,
            3 => CertFile,
            4 => KeyFile,
            5 => CrlFile,
            6 => OcspServer,
            7 => Alpn,
            8 => CaType,
            9 => CertType,
            10 => KeyType,
            11 => CheckCertificate,
            12 => CheckHostname,
            13 => PrintInfo,
            14 => Ocsp,
            15 => OcspStapling,
            16 => OcspCache,
            17 => SessionCache,
            18 => HpkpCache,
            _ => return None,
        })
    }
}

/// A borrowed-object configuration value (spec §4.A "borrowed object
/// pointer"). Rust has no untyped `void*`, so the object kinds that can
/// actually be set are enumerated instead.
pub enum ConfigObject {
    OcspCache(Arc<dyn OcspDb>),
    SessionCache(Arc<dyn TlsSessionDb>),
    HpkpCache(Arc<dyn HpkpDb>),
}

impl Config {
    /// String-valued setter, keyed by raw integer id (API-parity facade
    /// for `wget_ssl_set_config_string`). Unknown keys are logged at
    /// error level and otherwise ignored.
    pub fn set_string_opt(&mut self, key: i32, value: impl Into<String>) {
        let value = value.into();
        match ConfigKey::from_raw(key) {
            Some(ConfigKey::SecureProtocol) => self.secure_protocol = value,
            Some(ConfigKey::CaDirectory) => self.ca_directory = Some(value),
            Some(ConfigKey::CaFile) => self.ca_file = Some(PathBuf::from(value)),
            Some(ConfigKey::CertFile) => self.cert_file = Some(PathBuf::from(value)),
            Some(ConfigKey::KeyFile) => self.key_file = Some(PathBuf::from(value)),
            Some(ConfigKey::CrlFile) => self.crl_file = Some(PathBuf::from(value)),
            Some(ConfigKey::OcspServer) => self.ocsp_server = Some(value),
            Some(ConfigKey::Alpn) => self.alpn = Some(value),
            _ => log::error!("unknown string configuration key {key}"),
        }
    }

    /// Integer/boolean-valued setter (API-parity facade for
    /// `wget_ssl_set_config_int`).
    pub fn set_int_opt(&mut self, key: i32, value: i64) {
        let flag = value != 0;
        match ConfigKey::from_raw(key) {
            Some(ConfigKey::CheckCertificate) => self.check_certificate = flag,
            Some(ConfigKey::CheckHostname) => self.check_hostname = flag,
            Some(ConfigKey::PrintInfo) => self.print_info = flag,
            Some(ConfigKey::Ocsp) => self.ocsp = flag,
            Some(ConfigKey::OcspStapling) => self.ocsp_stapling = flag,
            Some(ConfigKey::CaType) => self.ca_type = x509_format(value),
            Some(ConfigKey::CertType) => self.cert_type = x509_format(value),
            Some(ConfigKey::KeyType) => self.key_type = x509_format(value),
            _ => log::error!("unknown integer configuration key {key}"),
        }
    }

    /// Borrowed-object setter (API-parity facade for
    /// `wget_ssl_set_config_object`).
    pub fn set_object_opt(&mut self, key: i32, value: ConfigObject) {
        match (ConfigKey::from_raw(key), value) {
            (Some(ConfigKey::OcspCache), ConfigObject::OcspCache(db)) => {
                self.ocsp_cert_cache = Some(db);
            }
            (Some(ConfigKey::SessionCache), ConfigObject::SessionCache(db)) => {
                self.tls_session_cache = Some(db);
            }
            (Some(ConfigKey::HpkpCache), ConfigObject::HpkpCache(db)) => {
                self.hpkp_cache = Some(db);
            }
            _ => log::error!("unknown or mismatched object configuration key {key}"),
        }
    }
}

fn x509_format(value: i64) -> X509Format {
    if value == 1 {
        X509Format::Der
    } else {
        X509Format::Pem
    }
}
