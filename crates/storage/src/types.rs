//! Common types shared by the collaborator contracts.

use bytes::Bytes;

/// Macro to define a newtype wrapper around `i64` with standard trait
/// implementations.
///
/// Each generated type:
/// - Is a transparent wrapper around `i64` (zero runtime cost)
/// - Derives `Copy`, `Clone`, `Debug`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Derives `Serialize` and `Deserialize` (transparent)
/// - Implements `From<i64>` and `Into<i64>`
/// - Implements `Display` that outputs the inner value
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Identity of a ledger in the log service.
    ///
    /// Ledger ids are assigned by the log service in increasing order and are
    /// never reused, so a chain entry keeps pointing at the same bytes for
    /// the lifetime of the ledger.
    ///
    /// # Examples
    ///
    /// ```
    /// use segmentstore_storage::LedgerId;
    ///
    /// let ledger = LedgerId::from(42);
    /// assert_eq!(i64::from(ledger), 42);
    /// assert_eq!(ledger.to_string(), "42");
    /// ```
    LedgerId
);

define_id!(
    /// Opaque version token of a metadata record.
    ///
    /// Callers must not interpret the value; they only hand it back to
    /// [`MetadataStore::write_record`](crate::MetadataStore::write_record) and
    /// [`MetadataStore::delete_record`](crate::MetadataStore::delete_record)
    /// as the compare-and-swap precondition.
    Version
);

/// A metadata record together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// The stored value.
    pub value: Bytes,

    /// Version to pass back for conditional updates.
    pub version: Version,
}

impl Record {
    /// Creates a new record.
    pub fn new(value: Bytes, version: Version) -> Self {
        Self { value, version }
    }
}
