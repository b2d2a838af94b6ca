/**
 * The collector address.
 *
 * An `Endpoint` is just a host name and a port. Nothing is resolved when it
 * is built: DNS lookup happens each time the transport (re)connects, so a
 * collector that moves behind a name is picked up after the next failure.
 */
use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use crate::error::{ConfigError, TransportError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /**
     * Resolves the endpoint to every socket address it maps to.
     *
     * An empty resolution is reported as an error too: there is nothing to
     * connect to either way.
     */
    pub fn resolve(&self) -> Result<Vec<SocketAddr>, TransportError> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                endpoint: self.to_string(),
                source,
            })?
            .collect();

        if addrs.is_empty() {
            return Err(TransportError::Resolve {
                endpoint: self.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses resolved"),
            });
        }

        Ok(addrs)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort("0".to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/**
 * Parses `host:port`, accepting bracketed IPv6 literals (`[::1]:5000`).
 */
impl FromStr for Endpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, after) = rest.split_once(']').ok_or(ConfigError::MissingPort)?;
            let port = after.strip_prefix(':').ok_or(ConfigError::MissingPort)?;
            (host, port)
        } else {
            s.rsplit_once(':').ok_or(ConfigError::MissingPort)?
        };

        if host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }

        let port: u16 = port
            .parse()
            .map_err(|_| ConfigError::InvalidPort(port.to_string()))?;

        let endpoint = Endpoint::new(host, port);
        endpoint.validate()?;
        Ok(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_port() {
        let endpoint: Endpoint = "logs.internal:5044".parse().unwrap();
        assert_eq!(endpoint.host(), "logs.internal");
        assert_eq!(endpoint.port(), 5044);
        assert_eq!(endpoint.to_string(), "logs.internal:5044");
    }

    #[test]
    fn test_parse_ipv6() {
        let endpoint: Endpoint = "[::1]:5000".parse().unwrap();
        assert_eq!(endpoint.host(), "::1");
        assert_eq!(endpoint.port(), 5000);
        assert_eq!(endpoint.to_string(), "[::1]:5000");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!("localhost".parse::<Endpoint>(), Err(ConfigError::MissingPort));
        assert_eq!(":5000".parse::<Endpoint>(), Err(ConfigError::EmptyHost));
        assert_eq!(
            "localhost:http".parse::<Endpoint>(),
            Err(ConfigError::InvalidPort("http".into()))
        );
        assert_eq!(
            "localhost:0".parse::<Endpoint>(),
            Err(ConfigError::InvalidPort("0".into()))
        );
        assert_eq!("[::1]5000".parse::<Endpoint>(), Err(ConfigError::MissingPort));
    }

    #[test]
    fn test_construction_does_not_resolve() {
        // Must not fail even though the name can never resolve.
        let endpoint = Endpoint::new("does-not-exist.invalid", 5000);
        assert_eq!(endpoint.port(), 5000);
    }

    #[test]
    fn test_resolve_loopback() {
        let addrs = Endpoint::new("127.0.0.1", 5000).resolve().unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:5000".parse::<SocketAddr>().unwrap()]);
    }

    #[test]
    fn test_resolve_failure_is_transport_error() {
        let err = Endpoint::new("does-not-exist.invalid", 5000)
            .resolve()
            .unwrap_err();
        assert!(matches!(err, TransportError::Resolve { .. }));
    }
}
