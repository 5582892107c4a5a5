use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

/// Namespace shared by all component ids. The last two bytes are replaced by a discriminator.
const NAMESPACE: Uuid = Uuid::from_u128(0x3c6d_92f0_5a1e_4b87_a9d2_70e4_1f5c_0000);

/// Derives the 16 byte id of a component from its discriminator.
pub fn component_bytes(discriminator: u16) -> [u8; 16] {
    let mut bytes = *NAMESPACE.as_bytes();
    bytes[14..].copy_from_slice(&discriminator.to_be_bytes());
    bytes
}

/// Identifies a transactional component. Journal entries are tagged with the id bytes so that
/// recovery can route each entry to its owner.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentId {
    label: String,
    bytes: [u8; 16],
}

impl Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.label, self.uuid())
    }
}

impl ComponentId {
    pub fn new(label: impl Into<String>, discriminator: u16) -> Self {
        Self { label: label.into(), bytes: component_bytes(discriminator) }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn bytes(&self) -> &[u8; 16] {
        &self.bytes
    }

    pub fn uuid(&self) -> Uuid {
        Uuid::from_bytes(self.bytes)
    }
}
