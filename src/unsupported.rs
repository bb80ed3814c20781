//! The no-crypto-provider build variant (`boring-tls` feature disabled).
//! Every call is a safe no-op or a fixed error, mirroring
//! `ssl_unsupported.c`: callers can always link against this crate, and
//! a build with no TLS provider compiled in still behaves predictably
//! instead of failing to link.

use std::net::TcpStream;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{EngineError, Result};

pub struct Engine;

pub struct TlsSession;

impl Engine {
    pub fn new(_config: Config) -> Result<Engine> {
        Ok(Engine)
    }

    pub fn open(&self, _tcp: TcpStream, _hostname: &str, _timeout_ms: i32) -> Result<TlsSession> {
        Err(EngineError::TlsDisabled)
    }
}

impl TlsSession {
    pub fn read_timeout(&mut self, _buf: &mut [u8], _timeout_ms: i32) -> Result<usize> {
        Ok(0)
    }

    pub fn write_timeout(&mut self, _buf: &[u8], _timeout_ms: i32) -> Result<usize> {
        Ok(0)
    }

    pub fn close(self, _timeout_ms: i32) -> Result<()> {
        Ok(())
    }
}

pub struct GlobalEngine;

impl GlobalEngine {
    pub fn init(_config: Config) -> Result<()> {
        Ok(())
    }

    pub fn deinit() {}

    pub fn open(_tcp: TcpStream, _hostname: &str, _timeout_ms: i32) -> Result<TlsSession> {
        Err(EngineError::TlsDisabled)
    }

    pub fn set_tls_stats_callback(_callback: Option<Arc<dyn Fn(&str) + Send + Sync>>) {}

    pub fn tls_stats() -> Option<String> {
        None
    }

    pub fn set_ocsp_stats_callback(_callback: Option<Arc<dyn Fn(&str) + Send + Sync>>) {}

    pub fn ocsp_stats() -> Option<String> {
        None
    }
}
