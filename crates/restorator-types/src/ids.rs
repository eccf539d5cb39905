//! Type-safe identifier wrappers.
//!
//! Social groups are identified by the integer keys of the catalog they
//! were loaded from. Wrapping them keeps a group id from being confused
//! with an age or a head-count at compile time.

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around a `u32` key with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Create an identifier from its raw key.
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Return the inner key.
            pub const fn into_inner(self) -> u32 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            fn from(raw: u32) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for u32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a social group in the catalog.
    SocialGroupId
}
