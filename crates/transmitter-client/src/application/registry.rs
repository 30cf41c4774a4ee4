//! Registry binder: turns global advertisements into bound capabilities.
//!
//! During negotiation the server advertises its globals on the registry
//! object.  Each interface the transmitter understands is bound exactly
//! once per connection; anything else is ignored.

use tracing::{debug, warn};
use transmitter_core::{CapabilityKind, ObjectId, WireMessage};

use crate::application::transport::{TransportError, WireConnection};

/// Highest interface version the client speaks.
pub const SUPPORTED_VERSION: u32 = 1;

/// A capability bound on the current connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundGlobal {
    /// Registry name the server advertised the global under.
    pub name: u32,
    /// Client-side object the global was bound to.
    pub id: ObjectId,
}

/// What [`BoundGlobals::bind`] did with one advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advertisement {
    Bound(CapabilityKind, ObjectId),
    /// A second advertisement of an interface that is already bound.
    Duplicate(CapabilityKind),
    /// Not an interface the transmitter uses.
    Ignored,
}

/// The four capability slots of one connection.
#[derive(Debug, Default)]
pub struct BoundGlobals {
    compositor: Option<BoundGlobal>,
    blob_factory: Option<BoundGlobal>,
    seat: Option<BoundGlobal>,
    ivi_application: Option<BoundGlobal>,
}

impl BoundGlobals {
    fn slot(&self, kind: CapabilityKind) -> &Option<BoundGlobal> {
        match kind {
            CapabilityKind::Compositor => &self.compositor,
            CapabilityKind::BlobFactory => &self.blob_factory,
            CapabilityKind::Seat => &self.seat,
            CapabilityKind::IviApplication => &self.ivi_application,
        }
    }

    fn slot_mut(&mut self, kind: CapabilityKind) -> &mut Option<BoundGlobal> {
        match kind {
            CapabilityKind::Compositor => &mut self.compositor,
            CapabilityKind::BlobFactory => &mut self.blob_factory,
            CapabilityKind::Seat => &mut self.seat,
            CapabilityKind::IviApplication => &mut self.ivi_application,
        }
    }

    /// Object bound for `kind`, if any.
    pub fn get(&self, kind: CapabilityKind) -> Option<ObjectId> {
        self.slot(kind).map(|global| global.id)
    }

    /// Capability bound under registry name `name`, if any.
    pub fn kind_of_name(&self, name: u32) -> Option<CapabilityKind> {
        CapabilityKind::ALL
            .into_iter()
            .find(|kind| self.slot(*kind).is_some_and(|global| global.name == name))
    }

    /// Capabilities not yet bound, in declaration order.
    pub fn missing(&self) -> Vec<CapabilityKind> {
        CapabilityKind::ALL
            .into_iter()
            .filter(|kind| self.slot(*kind).is_none())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Handles one global advertisement, sending a bind request through
    /// `wire` when the interface is wanted and not yet bound.
    ///
    /// A duplicate advertisement is a server bug; it trips a debug
    /// assertion and is otherwise ignored so the first binding survives.
    pub fn bind<W: WireConnection>(
        &mut self,
        wire: &mut W,
        registry: ObjectId,
        name: u32,
        interface: &str,
        version: u32,
    ) -> Result<Advertisement, TransportError> {
        let Some(kind) = CapabilityKind::from_interface(interface) else {
            debug!(name, interface, "ignoring unknown global");
            return Ok(Advertisement::Ignored);
        };

        let slot = self.slot_mut(kind);
        debug_assert!(slot.is_none(), "capability {kind} advertised twice");
        if slot.is_some() {
            warn!(name, %kind, "capability advertised twice; keeping the first binding");
            return Ok(Advertisement::Duplicate(kind));
        }

        let id = wire.new_id();
        wire.send(
            registry,
            WireMessage::Bind {
                name,
                interface: interface.to_string(),
                version: version.min(SUPPORTED_VERSION),
                id,
            },
        )?;
        *slot = Some(BoundGlobal { name, id });
        debug!(name, %kind, %id, "bound capability");
        Ok(Advertisement::Bound(kind, id))
    }
}
