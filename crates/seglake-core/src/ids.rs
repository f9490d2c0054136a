use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Hybrid logical timestamp carried by stream positions.
pub type Timestamp = u64;

macro_rules! define_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw identifier.
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw identifier.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

define_id!(SegmentId, "Unique identifier for a segment.");
define_id!(CollectionId, "Unique identifier for a collection.");
define_id!(
    PartitionId,
    "Unique identifier for a partition within a collection."
);
define_id!(FieldId, "Identifier of a field within a collection schema.");
define_id!(PlanId, "Identifier of a compaction plan.");
define_id!(NodeId, "Identifier of a data node.");

impl PartitionId {
    /// Wildcard partition matching every partition in replica filters.
    pub const ALL: PartitionId = PartitionId(-1);

    /// Returns true when this is the wildcard partition.
    #[must_use]
    pub const fn is_all(self) -> bool {
        self.0 == Self::ALL.0
    }
}
