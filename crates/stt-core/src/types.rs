//! Core identifier types with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Identifiers are assigned by the store and start at 1.
    #[error("{field} must be positive, got {value}")]
    NonPositiveId { field: &'static str, value: i64 },

    /// The identifier text was not an integer.
    #[error("invalid {field}: {value}")]
    InvalidId { field: &'static str, value: String },

    /// Unknown range name.
    #[error("unknown range: {value}")]
    UnknownRange { value: String },
}

/// Generates a validated integer ID newtype with common trait implementations.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "i64", into = "i64")]
        pub struct $name(i64);

        impl $name {
            /// Creates a new ID after validation.
            pub const fn new(id: i64) -> Result<Self, ValidationError> {
                if id <= 0 {
                    return Err(ValidationError::NonPositiveId {
                        field: $field_name,
                        value: id,
                    });
                }
                Ok(Self(id))
            }

            /// Returns the raw integer value.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl TryFrom<i64> for $name {
            type Error = ValidationError;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value: i64 = s.trim().parse().map_err(|_| ValidationError::InvalidId {
                    field: $field_name,
                    value: s.to_string(),
                })?;
                Self::new(value)
            }
        }
    };
}

define_id!(
    /// Identifier of a stored (completed) record.
    RecordId, "record ID"
);

define_id!(
    /// Identifier of an activity type ("record type").
    ///
    /// A running record is keyed by its type: at most one record of each
    /// type can be in progress.
    RecordTypeId, "record type ID"
);

define_id!(
    /// Identifier of an activity category.
    CategoryId, "category ID"
);

define_id!(
    /// Identifier of a record tag.
    TagId, "tag ID"
);

/// Key of a statistics entry.
///
/// Untracked time has its own variant so it can never be confused with a
/// real record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticsId {
    Type(RecordTypeId),
    Untracked,
}

impl StatisticsId {
    /// Returns the record type, or `None` for untracked time.
    pub const fn type_id(self) -> Option<RecordTypeId> {
        match self {
            Self::Type(id) => Some(id),
            Self::Untracked => None,
        }
    }

    pub const fn is_untracked(self) -> bool {
        matches!(self, Self::Untracked)
    }
}

impl fmt::Display for StatisticsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(id) => write!(f, "{id}"),
            Self::Untracked => write!(f, "untracked"),
        }
    }
}
