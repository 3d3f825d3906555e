use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use taskdeck_shared::RecordId;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub RecordId);

        impl $name {
            pub fn get(self) -> RecordId {
                self.0
            }
        }

        impl From<RecordId> for $name {
            fn from(value: RecordId) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<RecordId>().map(Self)
            }
        }
    };
}

record_id!(
    /// Server-assigned task identifier.
    TaskId
);
record_id!(CategoryId);
record_id!(SubtaskId);
