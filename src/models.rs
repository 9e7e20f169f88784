use crate::config::Config;
use crate::effects::VideoEffects;
use crate::jobs::{JobRegistry, JobStatus, Resolution};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub registry: JobRegistry,
    pub config: Config,
    /// Bounds the number of concurrently running ffmpeg processes.
    pub transcode_slots: Arc<Semaphore>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    #[serde(default = "default_filename")]
    pub filename: String,
    #[serde(default)]
    pub file_size: u64,
}

fn default_filename() -> String {
    "upload.mp4".to_string()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub job_id: Uuid,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum ChunkResponse {
    #[serde(rename_all = "camelCase")]
    Ack { complete: bool, chunk_index: u32 },
    #[serde(rename_all = "camelCase")]
    Complete {
        complete: bool,
        job_id: Uuid,
        filename: Option<String>,
        duration: Option<f64>,
        resolution: Option<Resolution>,
        file_size: u64,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub job_id: Uuid,
    #[serde(default)]
    pub effects: VideoEffects,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: u8,
    /// Always present in the wire form; null unless the job failed.
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_ack_wire_shape() {
        let ack = ChunkResponse::Ack {
            complete: false,
            chunk_index: 3,
        };
        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"complete": false, "chunkIndex": 3})
        );
    }

    #[test]
    fn status_response_serializes_null_error() {
        let resp = StatusResponse {
            job_id: Uuid::nil(),
            status: JobStatus::Uploading,
            progress: 0,
            error: None,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "uploading");
        assert_eq!(json["progress"], 0);
        assert!(json["error"].is_null());
    }

    #[test]
    fn upload_request_defaults() {
        let req: UploadRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.filename, "upload.mp4");
        assert_eq!(req.file_size, 0);
    }
}
