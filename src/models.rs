//! Wire messages and pipeline result types

use serde::{Deserialize, Serialize};

/// Dimension of the semantic embedding space (audio and text share it)
pub const EMBEDDING_DIM: usize = 512;

/// Asset status written on successful analysis
pub const STATUS_ANALYZED: i32 = 1;
/// Asset status written when analysis fails
pub const STATUS_ANALYSIS_FAILED: i32 = 4;

/// Inbound task message, published by the asset service on upload
///
/// Wire form: `{"assetId": 42, "storageName": "audio/2026/02/uuid.mp3"}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisTask {
    /// Asset primary key in the shared relational store
    pub asset_id: i64,
    /// Blob storage object name for the uploaded audio
    pub storage_name: String,
}

impl AnalysisTask {
    /// A task is well-formed only if both fields carry usable values.
    /// Malformed tasks are acknowledged and dropped, never retried.
    pub fn is_valid(&self) -> bool {
        self.asset_id > 0 && !self.storage_name.trim().is_empty()
    }
}

/// Outbound completion event, published after a successful persistence write
///
/// Wire form: `{"assetId": 42}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvent {
    pub asset_id: i64,
}

/// Result of the Analysis Stage (tempo, key, duration)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    /// Estimated tempo in beats per minute, floored at 1
    pub bpm: u32,
    /// Estimated musical key, e.g. "C Major" or "A Minor"
    pub key: String,
    /// Audio duration in whole seconds
    pub duration: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_parses_camel_case_wire_form() {
        let task: AnalysisTask =
            serde_json::from_str(r#"{"assetId": 42, "storageName": "audio/x.mp3"}"#).unwrap();
        assert_eq!(task.asset_id, 42);
        assert_eq!(task.storage_name, "audio/x.mp3");
        assert!(task.is_valid());
    }

    #[test]
    fn task_missing_field_is_a_parse_error() {
        let result = serde_json::from_str::<AnalysisTask>(r#"{"assetId": 42}"#);
        assert!(result.is_err());
    }

    #[test]
    fn task_with_empty_storage_name_is_invalid() {
        let task: AnalysisTask =
            serde_json::from_str(r#"{"assetId": 42, "storageName": ""}"#).unwrap();
        assert!(!task.is_valid());
    }

    #[test]
    fn completion_event_wire_form() {
        let event = CompletionEvent { asset_id: 42 };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"assetId":42}"#);
    }
}
