use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Authored content and the room API use opaque string ids (client-generated
// UUIDs, but also hand-written slugs like "wait-for-simulation"), so ids wrap a
// String rather than a Uuid.
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Fresh random id (v4 UUID rendered as a string).
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

// Step graph IDs
define_id!(StepId);
define_id!(FlowId);
define_id!(StageId);

// Registry IDs (the value stored in `curStageId`)
define_id!(StageListId);

// Room IDs
define_id!(RoomId);
define_id!(PlayerId);
define_id!(MessageId);
define_id!(SessionId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = StepId::new("step-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"step-1\"");

        let parsed: StageListId = serde_json::from_str("\"intro-discussion\"").unwrap();
        assert_eq!(parsed.as_str(), "intro-discussion");
    }

    #[test]
    fn generated_ids_are_uuids() {
        let id = MessageId::generate();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
        assert_ne!(id, MessageId::generate());
    }

    #[test]
    fn empty_id_reports_empty() {
        assert!(StepId::default().is_empty());
        assert!(!StepId::from("a").is_empty());
    }
}
