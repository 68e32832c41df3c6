//! Handlers for upscale jobs: submission, status, download and cleanup.

use axum::extract::{Multipart, Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use upscaler_core::codec;
use upscaler_core::error::CoreError;
use upscaler_core::raster::RasterImage;
use upscaler_core::types::JobId;
use upscaler_core::validation::parse_scale_entries;
use upscaler_pipeline::{JobRecord, JobRequest};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Filename used when the upload carries none.
const FALLBACK_FILENAME: &str = "image.png";

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub job_id: JobId,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

// ---------------------------------------------------------------------------
// Upload parsing
// ---------------------------------------------------------------------------

/// Raw multipart fields of an upscale request.
#[derive(Default)]
struct UpscaleForm {
    file: Option<(String, Vec<u8>)>,
    scales: Option<String>,
    resample_mode: Option<String>,
    show_progress: Option<String>,
    job_id: Option<String>,
}

impl UpscaleForm {
    async fn read(multipart: &mut Multipart) -> AppResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => {
                    let is_image = field
                        .content_type()
                        .is_some_and(|ct| ct.starts_with("image/"));
                    if !is_image {
                        return Err(AppError::BadRequest("File must be an image".into()));
                    }
                    let filename = upload_basename(field.file_name().unwrap_or_default());
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(e.to_string()))?;
                    form.file = Some((filename, bytes.to_vec()));
                }
                "scales" | "resample_mode" | "show_progress" | "job_id" => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(e.to_string()))?;
                    let slot = match name.as_str() {
                        "scales" => &mut form.scales,
                        "resample_mode" => &mut form.resample_mode,
                        "show_progress" => &mut form.show_progress,
                        _ => &mut form.job_id,
                    };
                    *slot = Some(value);
                }
                other => {
                    tracing::debug!(field = other, "Ignoring unknown multipart field");
                }
            }
        }

        Ok(form)
    }
}

/// Strip any client-side directory components from an upload filename.
fn upload_basename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if base.is_empty() || base == "." || base == ".." {
        FALLBACK_FILENAME.to_string()
    } else {
        base.to_string()
    }
}

/// Form-style boolean: `true/false`, `1/0`, `yes/no`, `on/off`.
fn parse_form_bool(raw: &str) -> AppResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(AppError::BadRequest(format!(
            "Invalid boolean for show_progress: '{raw}'"
        ))),
    }
}

async fn decode_upload(bytes: Vec<u8>) -> AppResult<RasterImage> {
    tokio::task::spawn_blocking(move || codec::decode(&bytes))
        .await
        .map_err(|e| AppError::InternalError(format!("Decode task failed: {e}")))?
        .map_err(|e| {
            tracing::debug!(error = %e, "Rejected upload");
            AppError::BadRequest("Invalid file upload".into())
        })
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /upscale
///
/// Accept a multipart upload and enqueue an upscale job. Returns 202 with
/// the job id before any transform has run.
pub async fn upscale(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<AcceptedResponse>)> {
    let form = UpscaleForm::read(&mut multipart).await?;

    let (filename, bytes) = form
        .file
        .ok_or_else(|| AppError::BadRequest("No file uploaded".into()))?;
    let show_progress = match form.show_progress.as_deref() {
        Some(raw) => parse_form_bool(raw)?,
        None => true,
    };
    let scales = parse_scale_entries(form.scales.as_deref().unwrap_or("2"));
    let job_id = form.job_id.filter(|id| !id.trim().is_empty());

    let image = decode_upload(bytes).await?;

    let job_id = state
        .runner
        .submit(JobRequest {
            job_id,
            filename,
            image,
            scales,
            resample_mode: form.resample_mode,
            show_progress,
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            job_id,
            status: "accepted",
        }),
    ))
}

// ---------------------------------------------------------------------------
// Status / result / cleanup
// ---------------------------------------------------------------------------

/// GET /job/{job_id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<JobRecord>> {
    let job_id = lookup_id(&job_id)?;
    Ok(Json(state.runner.status(&job_id).await?))
}

/// GET /download/{job_id}
///
/// Streams the result artifact as an attachment. Jobs that have not
/// completed answer 400.
pub async fn download(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let job_id = lookup_id(&job_id)?;
    let result = state.runner.result(&job_id).await?;

    let disposition = format!("attachment; filename=\"{}\"", header_safe(&result.filename));

    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, result.content_type), (CONTENT_DISPOSITION, disposition)],
        result.bytes,
    ))
}

/// DELETE /job/{job_id}
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let job_id = lookup_id(&job_id)?;
    state.runner.cleanup(&job_id).await?;
    Ok(Json(MessageResponse {
        message: "Job cleaned up successfully",
    }))
}

/// Ids that could never have been issued cannot name a job.
pub(crate) fn lookup_id(raw: &str) -> AppResult<JobId> {
    JobId::parse(raw).map_err(|_| AppError::Core(CoreError::job_not_found(raw)))
}

/// Quoted header parameters allow visible ASCII only.
fn header_safe(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
