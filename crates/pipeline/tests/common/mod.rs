#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use upscaler_core::progress::ProgressSink;
use upscaler_core::raster::{ChannelLayout, RasterImage};
use upscaler_core::types::{Device, JobId, ResampleMode, Scale};
use upscaler_engine::{
    EngineCache, EngineError, EngineLoader, InterpolationEngine, InterpolationLoader,
    UpscaleEngine,
};
use upscaler_events::ProgressBroadcaster;
use upscaler_pipeline::{
    ArtifactHandle, ArtifactStore, JobRecord, JobRequest, JobRunner, JobRunnerConfig,
    StorageError,
};

// ---------------------------------------------------------------------------
// In-memory artifact store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<(JobId, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn artifacts_for(&self, job_id: &JobId) -> usize {
        self.items
            .lock()
            .unwrap()
            .keys()
            .filter(|(id, _)| id == job_id)
            .count()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn save(
        &self,
        job_id: &JobId,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<ArtifactHandle, StorageError> {
        self.items
            .lock()
            .unwrap()
            .insert((job_id.clone(), filename.to_string()), bytes);
        Ok(ArtifactHandle {
            job_id: job_id.clone(),
            filename: filename.to_string(),
        })
    }

    async fn load(&self, handle: &ArtifactHandle) -> Result<Vec<u8>, StorageError> {
        self.items
            .lock()
            .unwrap()
            .get(&(handle.job_id.clone(), handle.filename.clone()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(handle.filename.clone()))
    }

    async fn delete_job(&self, job_id: &JobId) -> Result<(), StorageError> {
        self.items.lock().unwrap().retain(|(id, _), _| id != job_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Gated engine: blocks every transform until the test opens the gate
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
    entered: AtomicUsize,
}

impl Gate {
    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cond.notify_all();
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    fn wait(&self) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cond.wait(open).unwrap();
        }
    }
}

struct GatedEngine {
    gate: Arc<Gate>,
    inner: InterpolationEngine,
}

impl UpscaleEngine for GatedEngine {
    fn predict(&self, image: &RasterImage) -> Result<RasterImage, EngineError> {
        self.gate.wait();
        self.inner.predict(image)
    }

    fn predict_with_progress(
        &self,
        image: &RasterImage,
        progress: &dyn ProgressSink,
    ) -> Result<RasterImage, EngineError> {
        self.gate.wait();
        self.inner.predict_with_progress(image, progress)
    }

    fn resample_mode(&self) -> ResampleMode {
        self.inner.resample_mode()
    }

    fn set_resample_mode(&self, mode: ResampleMode) {
        self.inner.set_resample_mode(mode)
    }
}

pub struct GatedLoader(pub Arc<Gate>);

impl EngineLoader for GatedLoader {
    fn load(&self, scale: Scale, device: Device) -> Result<Box<dyn UpscaleEngine>, EngineError> {
        Ok(Box::new(GatedEngine {
            gate: Arc::clone(&self.0),
            inner: InterpolationEngine::new(scale, device),
        }))
    }
}

/// Loader that always fails, as if the weight file were corrupt.
pub struct FailingLoader;

impl EngineLoader for FailingLoader {
    fn load(&self, _: Scale, _: Device) -> Result<Box<dyn UpscaleEngine>, EngineError> {
        Err(EngineError::Load("corrupt weights".into()))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub runner: JobRunner,
    pub store: Arc<MemoryStore>,
    pub broadcaster: Arc<ProgressBroadcaster>,
}

pub fn harness_with(loader: Arc<dyn EngineLoader>, max_concurrent_jobs: usize) -> Harness {
    let store = Arc::new(MemoryStore::default());
    let broadcaster = Arc::new(ProgressBroadcaster::new(Duration::from_millis(250)));
    let cache = Arc::new(EngineCache::new(loader, Device::Cpu));
    let config = JobRunnerConfig {
        max_concurrent_jobs,
        default_resample_mode: ResampleMode::Bicubic,
        ..JobRunnerConfig::default()
    };
    let runner = JobRunner::new(config, cache, broadcaster.clone(), store.clone());
    Harness {
        runner,
        store,
        broadcaster,
    }
}

pub fn harness() -> Harness {
    harness_with(Arc::new(InterpolationLoader::default()), 2)
}

pub fn opaque(width: u32, height: u32) -> RasterImage {
    RasterImage::filled(width, height, ChannelLayout::Rgb, &[30, 60, 90]).unwrap()
}

pub fn request(image: RasterImage, scales: &[&str]) -> JobRequest {
    JobRequest {
        job_id: None,
        filename: "photo.png".to_string(),
        image,
        scales: scales.iter().map(|s| s.to_string()).collect(),
        resample_mode: Some("bicubic".to_string()),
        show_progress: true,
    }
}

/// Poll until the job reaches a terminal state.
pub async fn wait_terminal(runner: &JobRunner, job_id: &JobId) -> JobRecord {
    for _ in 0..1000 {
        let record = runner.status(job_id).await.unwrap();
        if record.status.is_terminal() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish");
}

/// Poll until `cond` holds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
