//! Port negotiation.
//!
//! Every probe is a transient bind that is closed straight away; the server
//! binds for real once negotiation has settled on a port.

use crate::error::{ConfigError, Result, ServeError};
use std::net::{IpAddr, SocketAddr, TcpListener, ToSocketAddrs};

/// Outcome of port negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedPort {
    /// Port the user (or config) asked for
    pub requested: u16,
    /// Port that will actually be bound
    pub actual: u16,
}

impl NegotiatedPort {
    /// Whether a busy default port was swapped for another one.
    ///
    /// An OS-assigned port (requested 0) is not a substitution.
    pub fn substituted(&self) -> bool {
        self.requested != 0 && self.requested != self.actual
    }
}

/// Resolve `host` to the address the server binds to.
///
/// IPv4 results are preferred so `localhost` binds where browsers look first.
pub fn resolve_host(host: &str) -> Result<IpAddr> {
    let addrs: Vec<SocketAddr> = (host, 0)
        .to_socket_addrs()
        .map_err(|e| ConfigError::InvalidValue {
            field: "host".to_string(),
            value: host.to_string(),
            hint: format!("Host could not be resolved: {}", e),
        })?
        .collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .map(|addr| addr.ip())
        .ok_or_else(|| {
            ConfigError::InvalidValue {
                field: "host".to_string(),
                value: host.to_string(),
                hint: "Host resolved to no addresses".to_string(),
            }
            .into()
        })
}

/// Pick the port to listen on.
///
/// - port 0 asks the OS for an ephemeral port
/// - a free requested port is used as-is
/// - a busy requested port fails, unless it is the default port, in which
///   case up to `max_attempts` ports above it are probed
pub fn negotiate(
    requested: u16,
    host: &str,
    default_port: u16,
    max_attempts: u16,
) -> Result<NegotiatedPort> {
    let ip = resolve_host(host)?;

    if requested == 0 {
        let listener = TcpListener::bind(SocketAddr::new(ip, 0)).map_err(|e| ServeError::Bind {
            addr: format!("{}:0", host),
            source: e,
        })?;
        let actual = listener.local_addr()?.port();
        tracing::debug!(port = actual, "OS assigned ephemeral port");
        return Ok(NegotiatedPort { requested, actual });
    }

    if is_free(ip, requested) {
        return Ok(NegotiatedPort {
            requested,
            actual: requested,
        });
    }

    if requested != default_port {
        return Err(ServeError::PortUnavailable {
            host: host.to_string(),
            port: requested,
            hint: "The port was chosen explicitly, so no other port is tried. Free it or pass a different --port".to_string(),
        }
        .into());
    }

    for offset in 1..=max_attempts {
        let Some(candidate) = default_port.checked_add(offset) else {
            break;
        };
        tracing::debug!(port = candidate, "Probing port");
        if is_free(ip, candidate) {
            tracing::info!(
                requested = default_port,
                actual = candidate,
                "Default port busy, using next free port"
            );
            return Ok(NegotiatedPort {
                requested,
                actual: candidate,
            });
        }
    }

    Err(ServeError::PortUnavailable {
        host: host.to_string(),
        port: requested,
        hint: format!(
            "No free port found in {}..={}. Increase portScanAttempts or pass --port",
            default_port,
            default_port.saturating_add(max_attempts)
        ),
    }
    .into())
}

fn is_free(ip: IpAddr, port: u16) -> bool {
    TcpListener::bind(SocketAddr::new(ip, port)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;

    fn occupy() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[test]
    fn test_free_port_is_used_as_is() {
        let (listener, port) = occupy();
        drop(listener);

        let negotiated = negotiate(port, "127.0.0.1", port, 20).unwrap();
        assert_eq!(negotiated.actual, port);
        assert!(!negotiated.substituted());
    }

    #[test]
    fn test_busy_default_port_is_substituted() {
        let (_guard, port) = occupy();

        let negotiated = negotiate(port, "127.0.0.1", port, 20).unwrap();
        assert_ne!(negotiated.actual, port);
        assert!(negotiated.actual > port);
        assert!(negotiated.substituted());
    }

    #[test]
    fn test_busy_explicit_port_fails() {
        let (_guard, port) = occupy();
        let default_port = if port == 4200 { 4201 } else { 4200 };

        let err = negotiate(port, "127.0.0.1", default_port, 20).unwrap_err();
        assert!(matches!(
            err,
            CliError::Serve(ServeError::PortUnavailable { port: p, .. }) if p == port
        ));
    }

    #[test]
    fn test_port_zero_asks_the_os() {
        let negotiated = negotiate(0, "127.0.0.1", 4200, 20).unwrap();
        assert_ne!(negotiated.actual, 0);
        assert!(!negotiated.substituted());
    }

    #[test]
    fn test_localhost_resolves_to_loopback() {
        assert!(resolve_host("localhost").unwrap().is_loopback());
    }

    #[test]
    fn test_unresolvable_host() {
        assert!(resolve_host("no-such-host.invalid").is_err());
    }
}
