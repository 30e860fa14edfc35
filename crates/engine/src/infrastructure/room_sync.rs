//! GraphQL client for the room API.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

use arcade_domain::{ChatMessage, Room, RoomId, RoomStatePatch, Stage};

use crate::infrastructure::ports::{RoomSyncError, RoomSyncPort};

const ROOM_FIELDS: &str = r#"
  _id
  name
  gameData {
    gameId
    players { clientId name }
    chat {
      id
      message
      sender
      senderId
      senderName
      displayType
      disableUserInput
      mcqChoices
      isPromptResponse
      sessionId
    }
    globalStateData {
      curStageId
      curStepId
      roomOwnerId
      discussionDataStringified
      curGameState
      gameStateData { key value }
    }
    playerStateData {
      player
      animation
      gameStateData { key value }
    }
  }
"#;

const STEP_FIELDS: &str = r#"
  ... on SystemMessageStageStepType {
    stepId stepType lastStep jumpToStepId
    message
  }
  ... on RequestUserInputStageStepType {
    stepId stepType lastStep jumpToStepId
    message
    saveResponseVariableName
    disableFreeInput
    requireInputType
    responseMatching
    predefinedResponses { clientId message isArray jumpToStepId responseWeight }
  }
  ... on PromptStageStepType {
    stepId stepType lastStep jumpToStepId
    promptText
    responseFormat
    includeChatLogContext
    outputDataType
    jsonResponseData
    customSystemRole
  }
  ... on ConditionalActivityStepType {
    stepId stepType lastStep jumpToStepId
    conditionals { stateDataKey checking operation expectedValue targetStepId }
  }
  ... on EndOfPhaseReflectionStageStepType {
    stepId stepType lastStep jumpToStepId
    phaseTitle
    message
    questions
  }
"#;

/// Room API client bound to one room.
#[derive(Clone)]
pub struct GraphqlRoomSync {
    client: Client,
    endpoint: String,
    room_id: RoomId,
}

impl GraphqlRoomSync {
    pub fn new(endpoint: &str, room_id: RoomId) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            room_id,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    async fn exec_gql<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        query: String,
        variables: Value,
    ) -> Result<T, RoomSyncError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&GqlRequest { query, variables })
            .send()
            .await
            .map_err(|e| RoomSyncError::request(operation, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RoomSyncError::request(operation, format!("{status}: {body}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RoomSyncError::payload(operation, e))?;
        extract_data(operation, body)
    }
}

#[derive(Serialize)]
struct GqlRequest {
    query: String,
    variables: Value,
}

/// Pull `data.<operation>` out of a GraphQL response, surfacing `errors`.
fn extract_data<T: DeserializeOwned>(operation: &'static str, mut body: Value) -> Result<T, RoomSyncError> {
    if let Some(errors) = body.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let message = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(RoomSyncError::request(operation, message));
        }
    }

    let data = body
        .get_mut("data")
        .and_then(|data| data.get_mut(operation))
        .map(Value::take)
        .unwrap_or(Value::Null);
    serde_json::from_value(data).map_err(|e| RoomSyncError::payload(operation, e))
}

#[async_trait]
impl RoomSyncPort for GraphqlRoomSync {
    async fn fetch_room(&self) -> Result<Room, RoomSyncError> {
        let query = format!(
            "query FetchRoom($roomId: ID!) {{ fetchRoom(roomId: $roomId) {{ {ROOM_FIELDS} }} }}"
        );
        let room: Option<Room> = self
            .exec_gql("fetchRoom", query, json!({ "roomId": self.room_id }))
            .await?;
        room.ok_or_else(|| RoomSyncError::RoomNotFound(self.room_id.to_string()))
    }

    async fn update_room_game_data(&self, patch: RoomStatePatch) -> Result<(), RoomSyncError> {
        let query = "mutation UpdateRoomGameData($roomId: ID!, $gameData: GameDataInput!) { \
                     updateRoomGameData(roomId: $roomId, gameData: $gameData) { _id } }"
            .to_string();
        let _: Value = self
            .exec_gql(
                "updateRoomGameData",
                query,
                json!({ "roomId": self.room_id, "gameData": patch }),
            )
            .await?;
        Ok(())
    }

    async fn send_message(&self, message: ChatMessage) -> Result<(), RoomSyncError> {
        let query = "mutation SendMessage($roomId: ID!, $msg: ChatMessageInput!) { \
                     sendMessage(roomId: $roomId, msg: $msg) { _id } }"
            .to_string();
        let _: Value = self
            .exec_gql(
                "sendMessage",
                query,
                json!({ "roomId": self.room_id, "msg": message }),
            )
            .await?;
        Ok(())
    }

    async fn fetch_discussion_stages(&self) -> Result<Vec<Stage>, RoomSyncError> {
        let query = format!(
            "query FetchDiscussionStages {{ fetchDiscussionStages {{ \
             _id clientId title stageType description \
             flowsList {{ clientId name steps {{ {STEP_FIELDS} }} }} }} }}"
        );
        let stages: Option<Vec<Stage>> = self
            .exec_gql("fetchDiscussionStages", query, json!({}))
            .await?;
        Ok(stages.unwrap_or_default())
    }
}
