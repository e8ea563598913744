//! Arena identifiers.
//!
//! Entities refer to each other through these indices, never by ownership.
//! Every id is the entity's position in its arena.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Generate a `u32` newtype id with common derives, `Display` and arena
/// index conversion.
macro_rules! define_id {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn from_index(index: usize) -> Self {
                Self(index as u32)
            }

            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

define_id!(CityId);
define_id!(CountryId);
define_id!(RegionId);
define_id!(RouteId);
define_id!(ReligionId);
define_id!(CultureId);
