//! Typed IDs for type-safe entity references.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to generate typed ID wrappers.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Creates a new random ID using UUID v7 (time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            #[must_use]
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

typed_id!(UploadId, "Unique identifier for a resumable upload session.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_id_display_parse() {
        let id = UploadId::new();
        let parsed: UploadId = id.to_string().parse().expect("valid id");
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_upload_id_rejects_garbage() {
        assert!("../../etc/passwd".parse::<UploadId>().is_err());
    }

    #[test]
    fn test_upload_ids_are_unique() {
        assert_ne!(UploadId::new(), UploadId::new());
    }

    #[test]
    fn test_upload_id_serializes_transparently() {
        let uuid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").expect("valid uuid");
        let json = serde_json::to_string(&UploadId::from_uuid(uuid)).expect("serialize");
        assert_eq!(json, "\"550e8400-e29b-41d4-a716-446655440000\"");
    }
}
