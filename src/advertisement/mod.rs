//! Discovery advertisements.
//!
//! An [`Advertisement`] tells peers which control and equipment endpoints a
//! process hosts.  It travels as one brace-framed JSON document per UDP
//! datagram:
//!
//! ```json
//! {"s":{"a":"10.0.0.5","p":40110},"e":[{"i":3,"n":"Rack","h":{"a":"10.0.0.5","p":41000}}],"t":10}
//! ```
//!
//! Empty lists and the zero type are left out to keep broadcasts small.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{CrosspointInfo, HostInfo};

mod addresses;
mod manager;

pub use addresses::AddressSet;
pub use manager::{AdvertisementListener, AdvertisementManager, LocalEndpoints, ManagerConfig};

/// How an advertisement was sent and what it asks of the receiver.  The
/// numbers are part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum AdvertisementType {
    #[default]
    Localhost,
    Multicast,
    Broadcast,
    Directed,
    DirectedRemove,
    Mesh,
    MeshRemove,
    CrosspointRemove,
    /// A type introduced by a newer peer.
    Unknown(i32),
}

impl AdvertisementType {
    pub fn value(self) -> i32 {
        match self {
            Self::Localhost => 0,
            Self::Multicast => 10,
            Self::Broadcast => 20,
            Self::Directed => 30,
            Self::DirectedRemove => 31,
            Self::Mesh => 40,
            Self::MeshRemove => 41,
            Self::CrosspointRemove => 50,
            Self::Unknown(value) => value,
        }
    }

    /// Whether the receiver should forget the advertised endpoints.
    pub fn is_removal(self) -> bool {
        matches!(
            self,
            Self::DirectedRemove | Self::MeshRemove | Self::CrosspointRemove
        )
    }

    fn is_localhost(&self) -> bool {
        *self == Self::Localhost
    }
}

impl From<i32> for AdvertisementType {
    fn from(value: i32) -> Self {
        match value {
            0 => Self::Localhost,
            10 => Self::Multicast,
            20 => Self::Broadcast,
            30 => Self::Directed,
            31 => Self::DirectedRemove,
            40 => Self::Mesh,
            41 => Self::MeshRemove,
            50 => Self::CrosspointRemove,
            other => Self::Unknown(other),
        }
    }
}

impl From<AdvertisementType> for i32 {
    fn from(ty: AdvertisementType) -> Self {
        ty.value()
    }
}

/// A process's locally hosted endpoints, as announced to peers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Advertisement {
    #[serde(rename = "s", default)]
    pub source: HostInfo,
    #[serde(rename = "c", default, skip_serializing_if = "Vec::is_empty")]
    pub controls: Vec<CrosspointInfo>,
    #[serde(rename = "e", default, skip_serializing_if = "Vec::is_empty")]
    pub equipment: Vec<CrosspointInfo>,
    #[serde(rename = "t", default, skip_serializing_if = "AdvertisementType::is_localhost")]
    pub advertisement_type: AdvertisementType,
}

impl Advertisement {
    pub fn new(
        source: HostInfo,
        controls: Vec<CrosspointInfo>,
        equipment: Vec<CrosspointInfo>,
        advertisement_type: AdvertisementType,
    ) -> Self {
        Self {
            source,
            controls,
            equipment,
            advertisement_type,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty() && self.equipment.is_empty()
    }

    /// The same advertisement under another type.
    pub fn with_type(&self, advertisement_type: AdvertisementType) -> Self {
        Self {
            advertisement_type,
            ..self.clone()
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
