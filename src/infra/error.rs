use std::net::SocketAddr;

use thiserror::Error;

/// Failures while bringing up or running the process itself.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("trigger service stopped: {0}")]
    Serve(#[source] std::io::Error),
    #[error("tracing subscriber not installed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn bind(addr: SocketAddr, source: std::io::Error) -> Self {
        Self::Bind { addr, source }
    }
}
