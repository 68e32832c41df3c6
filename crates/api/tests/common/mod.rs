#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;
use upscaler_api::config::ServerConfig;
use upscaler_api::router::build_app_router;
use upscaler_api::state::AppState;
use upscaler_core::codec::{self, OutputFormat};
use upscaler_core::raster::{ChannelLayout, RasterImage};
use upscaler_core::types::DevicePreference;
use upscaler_engine::{EngineCache, InterpolationLoader};
use upscaler_events::ProgressBroadcaster;
use upscaler_pipeline::{JobRunner, JobRunnerConfig, LocalArtifactStore};

pub const BOUNDARY: &str = "upscaler-test-boundary";

/// Build a test `ServerConfig` writing artifacts under `output_dir`.
///
/// Uses `http://localhost:5173` as CORS origin and a 30-second request
/// timeout.
pub fn test_config(output_dir: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        max_upload_bytes: 8 * 1024 * 1024,
        output_dir: output_dir.to_path_buf(),
        weights_dir: None,
        device: DevicePreference::Auto,
        max_concurrent_jobs: 2,
        default_resample_mode: Default::default(),
        progress_send_timeout_ms: 250,
        max_output_pixels: 8192 * 8192,
    }
}

/// Build the full application router, as `main.rs` does, over a local
/// artifact store rooted at `output_dir`.
pub fn build_test_app(output_dir: &Path) -> (Router, AppState) {
    let config = test_config(output_dir);

    let store = Arc::new(LocalArtifactStore::new(config.output_dir.clone()));
    let cache = Arc::new(EngineCache::new(
        Arc::new(InterpolationLoader::default()),
        InterpolationLoader::resolve_device(config.device).unwrap(),
    ));
    let broadcaster = Arc::new(ProgressBroadcaster::new(config.progress_send_timeout()));
    let runner = Arc::new(JobRunner::new(
        JobRunnerConfig {
            max_concurrent_jobs: config.max_concurrent_jobs,
            default_resample_mode: config.default_resample_mode,
            max_output_pixels: config.max_output_pixels,
        },
        cache,
        broadcaster,
        store,
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        runner,
    };
    (build_app_router(state.clone(), &config), state)
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri).await
}

async fn send(app: Router, method: Method, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST a multipart form to `/upscale`.
pub async fn post_upscale(app: Router, form: Multipart) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/upscale")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(form.finish()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

/// Poll `GET /job/{id}` until the job leaves `accepted`/`processing`.
pub async fn wait_for_job(app: &Router, job_id: &str) -> serde_json::Value {
    for _ in 0..500 {
        let response = get(app.clone(), &format!("/job/{job_id}")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        if json["status"] == "completed" || json["status"] == "error" {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish");
}

// ---------------------------------------------------------------------------
// Multipart bodies
// ---------------------------------------------------------------------------

/// Minimal `multipart/form-data` body builder.
#[derive(Default)]
pub struct Multipart {
    body: Vec<u8>,
}

impl Multipart {
    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, filename: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.body
    }
}

/// A small opaque PNG.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RasterImage::filled(width, height, ChannelLayout::Rgb, &[10, 120, 200]).unwrap();
    codec::encode(&image, OutputFormat::Png).unwrap()
}
