//! Authored stages loaded from a JSON file.

use std::path::Path;

use arcade_domain::Stage;

use crate::infrastructure::ports::RoomSyncError;

/// Load a JSON array of stages, the same shape `fetchDiscussionStages`
/// returns.
pub fn load_stages(path: &Path) -> Result<Vec<Stage>, RoomSyncError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| RoomSyncError::request("loadStages", format!("{}: {e}", path.display())))?;
    let stages: Vec<Stage> = serde_json::from_str(&raw)
        .map_err(|e| RoomSyncError::payload("loadStages", format!("{}: {e}", path.display())))?;

    tracing::info!(path = %path.display(), count = stages.len(), "Loaded authored stages");
    Ok(stages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_stage_array() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"clientId": "intro", "flowsList": [{{"clientId": "f", "steps": [
                {{"stepId": "hi", "stepType": "SYSTEM_MESSAGE", "message": "Hi", "lastStep": true}}
            ]}}]}}]"#
        )
        .unwrap();

        let stages = load_stages(file.path()).unwrap();
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].client_id.as_str(), "intro");
        assert!(stages[0].is_discussion());
    }

    #[test]
    fn missing_file_is_a_request_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_stages(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, RoomSyncError::Request { .. }));
    }

    #[test]
    fn malformed_file_is_a_payload_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"not\": \"a list\"}}").unwrap();
        let err = load_stages(file.path()).unwrap_err();
        assert!(matches!(err, RoomSyncError::Payload { .. }));
    }
}
