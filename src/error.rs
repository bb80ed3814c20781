use std::{error, fmt, io};

use boring::error::ErrorStack;

/// The closed error taxonomy exposed at the engine boundary.
///
/// Mirrors the `WGET_E_*` enumeration of the original C engine: callers
/// need to distinguish a timed-out handshake from a certificate failure
/// from "something else went wrong", and nothing finer-grained than that.
#[derive(Debug)]
pub enum EngineError {
    /// Bad arguments at the API boundary (null/invalid socket, no hostname
    /// where one is required, etc).
    Invalid,
    /// Internal failure (provider context construction, ex-data index
    /// exhaustion, trust-store lookup) with no more specific classification.
    Unknown,
    /// The readiness poll timed out during handshake or transfer.
    Timeout,
    /// The handshake failed specifically because certificate verification
    /// failed (the revocation callback rejected the chain, or the
    /// provider's own chain validation did).
    Certificate,
    /// The handshake failed for any other reason.
    Handshake,
    /// This build has no crypto provider compiled in.
    TlsDisabled,
    /// A certificate/key file was readable but contained no usable
    /// certificate.
    InvalidCert,
    /// Wraps an I/O error from the underlying socket.
    Io(io::Error),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Invalid => write!(f, "invalid argument"),
            EngineError::Unknown => write!(f, "unknown internal error"),
            EngineError::Timeout => write!(f, "operation timed out"),
            EngineError::Certificate => write!(f, "certificate verification failed"),
            EngineError::Handshake => write!(f, "TLS handshake failed"),
            EngineError::TlsDisabled => write!(f, "TLS support is not compiled in"),
            EngineError::InvalidCert => write!(f, "invalid certificate"),
            EngineError::Io(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl error::Error for EngineError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            EngineError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for EngineError {
    fn from(e: io::Error) -> Self {
        EngineError::Io(e)
    }
}

impl From<ErrorStack> for EngineError {
    fn from(_: ErrorStack) -> Self {
        EngineError::Unknown
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Isolates the "was this a certificate verify failure, or something
/// else?" decision behind one exhaustive translator, per the design note
/// in spec §9 ("error discrimination after handshake").
///
/// BoringSSL (like OpenSSL) surfaces this as a reason string/code on the
/// error stack rather than a distinct variant, so we have to peek at it;
/// doing that peek in exactly one place keeps the scattering the spec
/// warns about from happening.
pub(crate) fn classify_handshake_error(stack: &ErrorStack) -> EngineError {
    for err in stack.errors() {
        if let Some(reason) = err.reason() {
            if reason.contains("certificate verify failed") {
                return EngineError::Certificate;
            }
        }
    }
    EngineError::Handshake
}
