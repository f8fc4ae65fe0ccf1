//! Type-safe identifier wrappers around ring positions.
//!
//! Agents and resources are both numbered `0..N` around the ring. Wrapping
//! the raw index in a newtype keeps an agent index from being passed where
//! a resource index is expected (agent `i` sits between resources `i` and
//! `i + 1`, so the two are easy to confuse).

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around a ring index with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub usize);

        impl $name {
            /// Create an identifier from a ring index.
            pub const fn new(index: usize) -> Self {
                Self(index)
            }

            /// Return the ring index.
            pub const fn index(self) -> usize {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<usize> for $name {
            fn from(index: usize) -> Self {
                Self(index)
            }
        }

        impl From<$name> for usize {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Position of an agent in the ring.
    AgentId
}

define_id! {
    /// Position of a shared resource in the ring.
    ///
    /// Resource `i` is shared by agent `i` and agent `(i + 1) mod N`.
    ResourceId
}
