//! The `Engine` singleton: owns the provider context built from a
//! [`Config`] and hands out connections. Refcounted init/deinit and the
//! `GlobalEngine` integer-keyed facade mirror `wget_ssl_init`/
//! `wget_ssl_deinit` (spec §3 "Engine State", §9 "re-architecture note").

use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use boring::ssl::{SslConnector, SslMethod};
use once_cell::sync::OnceCell;

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::orchestrator::{self, TlsSession};
use crate::poll::{PollFd, ReadinessPoll};
use crate::priority;
use crate::revocation;
use crate::transport::{OcspTransport, UreqOcspTransport};
use crate::trust;

/// A live TLS engine: a built provider context plus the config it was
/// built from. Constructing one does the expensive, fallible work
/// (trust-store/CRL loads, priority parsing); opening connections from it
/// is cheap.
pub struct Engine {
    connector: SslConnector,
    config: Config,
    transport: Arc<dyn OcspTransport>,
    poller: Arc<dyn ReadinessPoll>,
}

impl Engine {
    /// Builds a new engine from `config`. Fails only on the conditions
    /// spec §4.B/§4.C call out as fatal (bad priority string, unreadable
    /// CRL) — everything else best-effort degrades with a logged warning.
    pub fn new(config: Config) -> Result<Engine> {
        let mut builder = SslConnector::builder(SslMethod::tls_client()).map_err(EngineError::from)?;

        priority::apply_priority(&mut builder, &config.secure_protocol)?;
        priority::apply_alpn(&mut builder, config.alpn.as_deref());
        trust::load_trust(&mut builder, &config)?;
        revocation::install_callback(&mut builder, &config);

        let connector = builder.build();

        Ok(Engine {
            connector,
            config,
            transport: Arc::new(UreqOcspTransport::default()),
            poller: Arc::new(PollFd::default()),
        })
    }

    /// Overrides the default OCSP HTTP transport (tests, or callers who
    /// want requests routed through their own stack instead of `ureq`).
    pub fn with_transport(mut self, transport: Arc<dyn OcspTransport>) -> Engine {
        self.transport = transport;
        self
    }

    /// Overrides the default `libc::poll`-backed readiness primitive.
    pub fn with_poller(mut self, poller: Arc<dyn ReadinessPoll>) -> Engine {
        self.poller = poller;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Opens a TLS connection to `hostname` over `tcp` (spec §4.F `open`).
    pub fn open(&self, tcp: TcpStream, hostname: &str, timeout_ms: i32) -> Result<TlsSession> {
        orchestrator::open(
            &self.connector,
            &self.config,
            self.transport.clone(),
            self.poller.as_ref(),
            tcp,
            hostname,
            timeout_ms,
        )
    }
}

/// Integer-keyed, refcounted compatibility facade over a process-wide
/// engine instance (spec §3 Engine State / §9). Only one configuration
/// can be active at a time; nested `init`/`deinit` calls share it.
pub struct GlobalEngine {
    refcount: AtomicU64,
    state: Mutex<Option<Arc<Engine>>>,
}

static GLOBAL: OnceCell<GlobalEngine> = OnceCell::new();

impl GlobalEngine {
    fn get() -> &'static GlobalEngine {
        GLOBAL.get_or_init(|| GlobalEngine {
            refcount: AtomicU64::new(0),
            state: Mutex::new(None),
        })
    }

    /// Builds (or reuses, if already initialized) the process-wide
    /// engine from `config` and bumps the refcount. Mirrors
    /// `wget_ssl_init`'s "first caller builds, later callers just count"
    /// behavior.
    pub fn init(config: Config) -> Result<()> {
        let global = Self::get();
        let mut state = global.state.lock().unwrap();
        if state.is_none() {
            *state = Some(Arc::new(Engine::new(config)?));
        }
        global.refcount.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Decrements the refcount; tears down the engine once it reaches
    /// zero. Calling this without a matching `init` is a no-op.
    pub fn deinit() {
        let global = Self::get();
        let prev = global.refcount.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            Some(n.saturating_sub(1))
        });
        if prev == Ok(1) {
            *global.state.lock().unwrap() = None;
        }
    }

    fn engine(global: &GlobalEngine) -> Option<Arc<Engine>> {
        global.state.lock().unwrap().clone()
    }

    pub fn open(tcp: TcpStream, hostname: &str, timeout_ms: i32) -> Result<TlsSession> {
        let global = Self::get();
        let engine = Self::engine(global).ok_or(EngineError::Invalid)?;
        engine.open(tcp, hostname, timeout_ms)
    }

    /// Unimplemented stats hooks, mirroring `wget_tcp_set_stats_callback`
    /// for TLS/OCSP: must exist and must not crash, but this engine keeps
    /// no statistics yet.
    pub fn set_tls_stats_callback(_callback: Option<Arc<dyn Fn(&str) + Send + Sync>>) {}

    pub fn tls_stats() -> Option<String> {
        None
    }

    pub fn set_ocsp_stats_callback(_callback: Option<Arc<dyn Fn(&str) + Send + Sync>>) {}

    pub fn ocsp_stats() -> Option<String> {
        None
    }
}

