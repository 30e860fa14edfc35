use serde::{Deserialize, Serialize};

use crate::ids::PlayerId;
use crate::wire;

/// A participant in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub client_id: PlayerId,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub name: String,
}

impl Player {
    pub fn new(client_id: impl Into<PlayerId>, name: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            name: name.into(),
        }
    }
}
