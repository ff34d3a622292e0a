//! Endpoint addresses.

use crate::{Error, Result};
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

const SCHEME: &str = "tcp://";

/// A bound endpoint, written `tcp://host:port`.
///
/// IPv6 hosts keep their brackets, e.g. `tcp://[::1]:5555`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EndpointAddress {
    host: String,
    port: u16,
}

impl EndpointAddress {
    /// Creates an address from a host and port.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Address of an already-bound socket.
    #[must_use]
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Self::new(v4.ip().to_string(), v4.port()),
            SocketAddr::V6(v6) => Self::new(format!("[{}]", v6.ip()), v6.port()),
        }
    }

    /// Host part.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port part.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolves to the first matching socket address.
    ///
    /// # Errors
    /// Returns an error if the host does not resolve.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let joined = format!("{}:{}", self.host, self.port);
        joined
            .to_socket_addrs()
            .map_err(|_| Error::InvalidAddress(self.to_string()))?
            .next()
            .ok_or_else(|| Error::InvalidAddress(self.to_string()))
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}:{}", self.host, self.port)
    }
}

impl FromStr for EndpointAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidAddress(s.to_string());
        let rest = s.trim().strip_prefix(SCHEME).ok_or_else(invalid)?;
        let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        Ok(Self::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let addr: EndpointAddress = "tcp://127.0.0.1:5555".parse().unwrap();
        assert_eq!(addr.host(), "127.0.0.1");
        assert_eq!(addr.port(), 5555);
        assert_eq!(addr.to_string(), "tcp://127.0.0.1:5555");
        assert_eq!(addr.socket_addr().unwrap().port(), 5555);
    }

    #[test]
    fn test_ipv6_keeps_brackets() {
        let sock: SocketAddr = "[::1]:4000".parse().unwrap();
        let addr = EndpointAddress::from_socket_addr(sock);
        assert_eq!(addr.to_string(), "tcp://[::1]:4000");
        assert_eq!(addr.socket_addr().unwrap(), sock);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!("udp://127.0.0.1:1".parse::<EndpointAddress>().is_err());
        assert!("tcp://127.0.0.1".parse::<EndpointAddress>().is_err());
        assert!("tcp://:80".parse::<EndpointAddress>().is_err());
        assert!("tcp://host:99999".parse::<EndpointAddress>().is_err());
    }
}
