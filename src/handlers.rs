use crate::{
    ffmpeg,
    jobs::JobStatus,
    models::{
        AppState, ChunkResponse, ErrorResponse, ProcessRequest, ProcessResponse, StatusResponse,
        UploadRequest, UploadResponse,
    },
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};
use uuid::Uuid;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/upload", post(upload_handler))
        .route("/upload/chunk", post(chunk_handler))
        .route("/process", post(process_handler))
        .route("/status/:job_id", get(status_handler))
        .route("/download/:job_id", get(download_handler))
        .with_state(state)
}

/// Initialize a chunked upload: validate the filename and declared size,
/// create the job and an empty input file.
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, ApiError> {
    let ext = std::path::Path::new(&req.filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if !state.config.allowed_extensions.iter().any(|a| *a == ext) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!(
                "Unsupported file type. Allowed: {}",
                state.config.allowed_extensions.join(", ")
            ),
        ));
    }

    if req.file_size > state.config.max_upload_size {
        return Err(api_error(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!(
                "File too large. Maximum size: {}GB",
                state.config.max_upload_size / (1024 * 1024 * 1024)
            ),
        ));
    }

    tokio::fs::create_dir_all(&state.config.temp_dir)
        .await
        .map_err(|e| {
            error!("[POST /upload] Failed to create temp dir: {}", e);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to prepare upload",
            )
        })?;

    let job = state
        .registry
        .create(&state.config.temp_dir, &req.filename)
        .await;

    tokio::fs::write(&job.input_path, b"").await.map_err(|e| {
        error!("[POST /upload] Failed to create input file: {}", e);
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to create upload file",
        )
    })?;

    info!(
        "[POST /upload] 📁 {} ({} bytes declared) -> job {}",
        req.filename, req.file_size, job.id
    );

    Ok(Json(UploadResponse { job_id: job.id }))
}

fn header_u32(headers: &HeaderMap, name: &str, default: u32) -> Result<u32, ApiError> {
    match headers.get(name) {
        None => Ok(default),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| {
                api_error(StatusCode::BAD_REQUEST, format!("Invalid {} header", name))
            }),
    }
}

/// Receive one chunk and append it to the job's input file. Chunks must
/// arrive strictly in index order; the final chunk flips the job to
/// uploaded and probes it for metadata.
pub async fn chunk_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<ChunkResponse>, ApiError> {
    let job_id: Uuid = headers
        .get("x-job-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Missing X-Job-Id header"))?
        .parse()
        .map_err(|_| api_error(StatusCode::BAD_REQUEST, "Invalid X-Job-Id header"))?;

    let chunk_index = header_u32(&headers, "x-chunk-index", 0)?;
    let total_chunks = header_u32(&headers, "x-total-chunks", 1)?;

    let job = state
        .registry
        .get(job_id)
        .await
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Job not found"))?;

    if chunk_index != job.chunks_received {
        return Err(api_error(
            StatusCode::CONFLICT,
            format!(
                "Out-of-order chunk: expected index {}, got {}",
                job.chunks_received, chunk_index
            ),
        ));
    }

    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(&job.input_path)
        .await
        .map_err(|e| {
            error!(
                "[POST /upload/chunk] Failed to open input file for job {}: {}",
                job_id, e
            );
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to open upload file",
            )
        })?;

    let already_received = job.file_size.unwrap_or(0);
    let mut chunk_bytes: u64 = 0;
    let mut stream = body.into_data_stream();

    while let Some(piece) = stream.next().await {
        let piece = piece.map_err(|e| {
            error!(
                "[POST /upload/chunk] Failed to read chunk {} for job {}: {}",
                chunk_index, job_id, e
            );
            api_error(StatusCode::BAD_REQUEST, "Failed to read chunk body")
        })?;

        if already_received + chunk_bytes + piece.len() as u64 > state.config.max_upload_size {
            error!(
                "[POST /upload/chunk] Job {} exceeded the upload cap at chunk {}",
                job_id, chunk_index
            );
            return Err(api_error(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!(
                    "File exceeds maximum size of {}GB",
                    state.config.max_upload_size / (1024 * 1024 * 1024)
                ),
            ));
        }

        file.write_all(&piece).await.map_err(|e| {
            error!(
                "[POST /upload/chunk] Failed to write chunk {} for job {}: {}",
                chunk_index, job_id, e
            );
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to write chunk")
        })?;
        chunk_bytes += piece.len() as u64;
    }

    let new_size = already_received + chunk_bytes;
    state
        .registry
        .update(job_id, |j| {
            j.file_size = Some(new_size);
            j.chunks_received += 1;
        })
        .await;

    if chunk_index + 1 < total_chunks {
        return Ok(Json(ChunkResponse::Ack {
            complete: false,
            chunk_index,
        }));
    }

    // Final chunk: the upload is done whether or not probing works out.
    state
        .registry
        .update(job_id, |j| j.status = JobStatus::Uploaded)
        .await;

    match ffmpeg::probe(&job.input_path).await {
        Ok(meta) => {
            let file_size = meta.file_size.unwrap_or(new_size);
            state
                .registry
                .update(job_id, |j| {
                    j.duration = Some(meta.duration);
                    j.resolution = meta.resolution;
                    j.file_size = Some(file_size);
                })
                .await;

            info!(
                "[POST /upload/chunk] ✅ Job {} uploaded: {:.2}s, {} bytes",
                job_id, meta.duration, file_size
            );

            Ok(Json(ChunkResponse::Complete {
                complete: true,
                job_id,
                filename: job.filename,
                duration: Some(meta.duration),
                resolution: meta.resolution,
                file_size,
            }))
        }
        Err(e) => {
            warn!("[POST /upload/chunk] Probe failed for job {}: {}", job_id, e);
            Ok(Json(ChunkResponse::Complete {
                complete: true,
                job_id,
                filename: job.filename,
                duration: None,
                resolution: None,
                file_size: new_size,
            }))
        }
    }
}

/// Validate the effects configuration and kick off the transcode. The
/// request returns immediately; failures after this point surface through
/// the job record only.
pub async fn process_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, ApiError> {
    req.effects.validate().map_err(|e| {
        api_error(
            StatusCode::BAD_REQUEST,
            format!("Invalid effects configuration: {}", e),
        )
    })?;

    let job = state
        .registry
        .get(req.job_id)
        .await
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Job not found"))?;

    if job.status != JobStatus::Uploaded {
        return Err(api_error(
            StatusCode::CONFLICT,
            format!("Job is in state '{}', expected 'uploaded'", job.status),
        ));
    }

    state
        .registry
        .update(job.id, |j| {
            j.status = JobStatus::Processing;
            j.progress = 0;
        })
        .await;

    let registry = state.registry.clone();
    let slots = state.transcode_slots.clone();
    let settings = state.config.ffmpeg.clone();
    let effects = req.effects;

    tokio::spawn(async move {
        let _permit = match slots.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return, // semaphore closed, shutting down
        };

        if let Err(e) = ffmpeg::run_transcode(
            &registry,
            job.id,
            &job.input_path,
            &job.output_path,
            job.duration,
            &effects,
            &settings,
        )
        .await
        {
            error!("[POST /process] ❌ Job {} failed: {}", job.id, e);
        }
    });

    info!("[POST /process] 🎬 Job {} queued for transcode", req.job_id);

    Ok(Json(ProcessResponse {
        job_id: req.job_id,
        status: JobStatus::Processing,
    }))
}

pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<StatusResponse>, ApiError> {
    let job = state
        .registry
        .get(job_id)
        .await
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Job not found"))?;

    Ok(Json(StatusResponse {
        job_id,
        status: job.status,
        progress: job.progress,
        error: job.error,
    }))
}

/// Schedules job deletion a short delay after the download stream is
/// dropped, so trailing reads on a finished response still succeed.
struct DeferredCleanup {
    registry: crate::jobs::JobRegistry,
    job_id: Uuid,
    delay: Duration,
}

impl Drop for DeferredCleanup {
    fn drop(&mut self) {
        let registry = self.registry.clone();
        let job_id = self.job_id;
        let delay = self.delay;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                tokio::time::sleep(delay).await;
                registry.delete(job_id).await;
            });
        }
    }
}

pub async fn download_handler(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let job = state
        .registry
        .get(job_id)
        .await
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Job not found"))?;

    if job.status != JobStatus::Complete {
        return Err(api_error(
            StatusCode::CONFLICT,
            format!("Job is not complete (status: {})", job.status),
        ));
    }

    let meta = tokio::fs::metadata(&job.output_path)
        .await
        .map_err(|_| api_error(StatusCode::INTERNAL_SERVER_ERROR, "Output file not found"))?;

    let file = tokio::fs::File::open(&job.output_path).await.map_err(|e| {
        error!(
            "[GET /download] Failed to open output for job {}: {}",
            job_id, e
        );
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to open output file",
        )
    })?;

    let filename = match &job.filename {
        Some(name) => {
            let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
            format!("BODYCAM-{}.mp4", stem.replace('"', ""))
        }
        None => format!("BODYCAM-{}.mp4", &job.id.to_string()[..8]),
    };

    info!(
        "[GET /download] ⬇️  Job {} ({} bytes) as {}",
        job_id,
        meta.len(),
        filename
    );

    let guard = DeferredCleanup {
        registry: state.registry.clone(),
        job_id,
        delay: state.config.download_linger,
    };
    let stream = ReaderStream::new(file).map(move |piece| {
        let _ = &guard;
        piece
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_LENGTH, meta.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from_stream(stream))
        .map_err(|_| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to build response",
            )
        })
}
