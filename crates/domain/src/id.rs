//! Identifiers for modules, routes and interactions.
//!
//! Each id is a random v4 UUID serialized as its hyphenated string, so ids
//! written by hand in an interactions file load unchanged and survive a
//! restart. Ids also key the sorted maps a commit carries: their `Ord`
//! follows the byte order of the UUID, which matches the order of the
//! hyphenated strings.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[doc = $doc:expr])* $name:ident) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl Default for $name {
            fn default() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self::default()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

define_id!(
    /// Module instance, unique across every live interaction.
    ModuleId
);

define_id!(
    /// Route between two modules of one interaction.
    RouteId
);

define_id!(
    /// Interaction; loading a definition with a known id replaces it.
    InteractionId
);
