//! Server configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Where and as whom the server listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Domain announced in the greeting and the trace header
    pub domain: String,
    /// 0 picks a free port
    pub port: u16,
    pub bind_address: IpAddr,
    /// Set SO_REUSEADDR before binding
    pub reuse_address: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            domain: "localhost".to_owned(),
            port: 0,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            reuse_address: true,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_bind_address(mut self, address: IpAddr) -> Self {
        self.bind_address = address;
        self
    }

    /// Listen on the loopback interface only
    pub fn with_localhost(self) -> Self {
        self.with_bind_address(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    pub fn with_reuse_address(mut self, reuse: bool) -> Self {
        self.reuse_address = reuse;
        self
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}
