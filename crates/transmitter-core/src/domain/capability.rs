//! Server capability kinds.
//!
//! A remote server advertises its capabilities ("globals") by interface name
//! during the registry handshake.  The client only understands four of them;
//! everything else is ignored.

use serde::{Deserialize, Serialize};

/// The capabilities a connection binds, one handle each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CapabilityKind {
    /// Surface compositing: creates remote surfaces.
    Compositor,
    /// Buffer factory: turns opaque frame payloads into remote buffers.
    BlobFactory,
    /// Seat: input devices of the remote side.
    Seat,
    /// Shell-surface creation keyed by a numeric ivi surface id.
    IviApplication,
}

impl CapabilityKind {
    /// Every kind, in binding order.
    pub const ALL: [CapabilityKind; 4] = [
        CapabilityKind::Compositor,
        CapabilityKind::BlobFactory,
        CapabilityKind::Seat,
        CapabilityKind::IviApplication,
    ];

    /// Interface name the server advertises for this kind.
    pub fn interface(self) -> &'static str {
        match self {
            CapabilityKind::Compositor => "wthp_compositor",
            CapabilityKind::BlobFactory => "wthp_blob_factory",
            CapabilityKind::Seat => "wthp_seat",
            CapabilityKind::IviApplication => "wthp_ivi_application",
        }
    }

    /// Maps an advertised interface name to a kind, or `None` for interfaces
    /// this client does not use.
    pub fn from_interface(name: &str) -> Option<Self> {
        match name {
            "wthp_compositor" => Some(CapabilityKind::Compositor),
            "wthp_blob_factory" => Some(CapabilityKind::BlobFactory),
            "wthp_seat" => Some(CapabilityKind::Seat),
            "wthp_ivi_application" => Some(CapabilityKind::IviApplication),
            _ => None,
        }
    }
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.interface())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_interface_maps_each_known_name() {
        for kind in CapabilityKind::ALL {
            assert_eq!(CapabilityKind::from_interface(kind.interface()), Some(kind));
        }
    }

    #[test]
    fn test_from_interface_ignores_unknown_names() {
        assert_eq!(CapabilityKind::from_interface("wthp_output"), None);
        assert_eq!(CapabilityKind::from_interface(""), None);
        assert_eq!(CapabilityKind::from_interface("WTHP_COMPOSITOR"), None);
    }
}
