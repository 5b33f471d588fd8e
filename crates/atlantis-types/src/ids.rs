//! Type-safe identifier wrappers around plain integers.
//!
//! Workers and pearls are both numbered by the world description, so the
//! two id spaces overlap. Wrapping them in distinct newtypes prevents a
//! pearl id from ever being used where a worker id is expected.

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around an integer with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident($inner:ty)
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            /// Create an identifier from its raw value.
            pub const fn new(raw: $inner) -> Self {
                Self(raw)
            }

            /// Return the raw integer value.
            pub const fn into_inner(self) -> $inner {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(raw: $inner) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for $inner {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Identifier of a worker (node in the world graph).
    WorkerId(u32)
}

define_id! {
    /// Identifier of a pearl travelling through the world.
    PearlId(u64)
}
