//! Type-safe identifier wrappers.
//!
//! [`ConnectionId`] wraps a UUID v7 so log lines from successive
//! subscriptions sort by creation time. [`LayerId`] is a plain counter
//! handed out by a feature collection for each stored feature.

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
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
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
    /// Identifies one subscription made through `connect`.
    ///
    /// Stays the same across automatic reconnects so a caller's handle
    /// remains valid for the lifetime of the subscription.
    ConnectionId
}

/// Opaque reference to a feature stored in a feature collection.
///
/// Values are assigned by the collection in insertion order and are
/// never reused within one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LayerId(pub u64);

impl LayerId {
    /// Return the raw counter value.
    pub const fn into_inner(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for LayerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
        assert_ne!(a.into_inner(), Uuid::nil());
    }

    #[test]
    fn connection_id_display_matches_uuid() {
        let id = ConnectionId::new();
        assert_eq!(id.to_string(), id.into_inner().to_string());
    }

    #[test]
    fn layer_ids_order_by_counter() {
        assert!(LayerId(1) < LayerId(2));
        assert_eq!(LayerId(7).to_string(), "layer#7");
    }
}
