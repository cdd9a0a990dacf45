//! Config for socket addresses.
use std::{net::ToSocketAddrs, ops::Deref};

/// Parsable socket address, resolving host names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SocketAddr(std::net::SocketAddr);

impl Deref for SocketAddr {
    type Target = std::net::SocketAddr;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for SocketAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for SocketAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut addrs = s
            .to_socket_addrs()
            .map_err(|e| format!("Cannot parse socket address '{s}': {e}"))?;
        addrs
            .next()
            .map(Self)
            .ok_or_else(|| format!("Found no addresses for '{s}'"))
    }
}

impl From<SocketAddr> for std::net::SocketAddr {
    fn from(addr: SocketAddr) -> Self {
        addr.0
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn parses_ip_and_port() {
        let addr: std::net::SocketAddr = SocketAddr::from_str("127.0.0.1:8086").unwrap().into();
        assert_eq!(addr, std::net::SocketAddr::from(([127, 0, 0, 1], 8086)));
        assert_eq!(addr.port(), 8086);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(
            SocketAddr::from_str("!@INv_a1d(ad0/resp_!").unwrap_err(),
            "Cannot parse socket address '!@INv_a1d(ad0/resp_!': invalid socket address",
        );
    }
}
