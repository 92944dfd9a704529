//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Node identities and event identifiers are distinct types so they cannot
//! be mixed up at compile time. Both order by their raw bytes, which is the
//! order used to canonicalise connection endpoints.

use rand::Rng;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }

            /// Return the raw bytes of the identifier.
            pub const fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Identity of a simulated peer.
    NodeId
}

define_id! {
    /// Unique identifier stamped on every posted event.
    EventId
}

impl NodeId {
    /// Draw a random node identity from the given generator.
    ///
    /// Identities are version-4 UUIDs built from 16 random bytes, so a
    /// seeded generator always yields the same sequence of nodes.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0_u8; 16];
        rng.fill(&mut bytes);
        Self(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }

    /// Draw `count` random node identities.
    pub fn random_pool<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<Self> {
        (0..count).map(|_| Self::random(rng)).collect()
    }
}

impl EventId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}
