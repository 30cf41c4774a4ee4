//! Network endpoint of a remote display server.

use serde::{Deserialize, Serialize};

/// Host name or address plus TCP port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.address.contains(':') {
            // Bare IPv6 literal.
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_joins_address_and_port() {
        assert_eq!(Endpoint::new("10.0.0.5", 34400).to_string(), "10.0.0.5:34400");
    }

    #[test]
    fn test_display_brackets_ipv6() {
        assert_eq!(Endpoint::new("::1", 34400).to_string(), "[::1]:34400");
    }
}
