//! Keyed, lazily-constructed registry of engine handles.
//!
//! Construction is single-flight per key: the first caller for a key runs
//! the loader while concurrent callers for the same key wait on the same
//! cell and receive the same handle. Callers for other keys are never
//! blocked by it. A failed construction leaves the cell empty so the next
//! caller retries; failures are not cached.
//!
//! There is no eviction. The map grows with the number of distinct
//! `(scale, mode)` pairs ever requested.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, OnceCell};
use upscaler_core::types::Device;

use crate::engine::{EngineHandle, EngineKey, EngineLoader};
use crate::error::EngineError;

type Slot = Arc<OnceCell<Arc<EngineHandle>>>;

/// Shared engine cache. Wrap in `Arc` and hand to every job.
pub struct EngineCache {
    loader: Arc<dyn EngineLoader>,
    device: Device,
    slots: Mutex<HashMap<EngineKey, Slot>>,
}

impl EngineCache {
    pub fn new(loader: Arc<dyn EngineLoader>, device: Device) -> Self {
        Self {
            loader,
            device,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Return the handle for `key`, constructing it on first use.
    ///
    /// May wait for seconds while this or another task loads the engine.
    pub async fn acquire(&self, key: EngineKey) -> Result<Arc<EngineHandle>, EngineError> {
        // The map lock only covers slot lookup, never construction.
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(key).or_default())
        };

        if let Some(handle) = slot.get() {
            tracing::trace!(engine = %key, "Engine cache hit");
            return Ok(Arc::clone(handle));
        }

        let handle = slot.get_or_try_init(|| self.construct(key)).await?;
        Ok(Arc::clone(handle))
    }

    /// Number of constructed engines.
    pub async fn len(&self) -> usize {
        self.slots
            .lock()
            .await
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Keys of every constructed engine.
    pub async fn keys(&self) -> Vec<EngineKey> {
        self.slots
            .lock()
            .await
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(key, _)| *key)
            .collect()
    }

    async fn construct(&self, key: EngineKey) -> Result<Arc<EngineHandle>, EngineError> {
        let loader = Arc::clone(&self.loader);
        let device = self.device;
        tracing::info!(engine = %key, device = %device, "Loading upscale engine");

        let started = Instant::now();
        let engine = tokio::task::spawn_blocking(move || loader.load(key.scale, device))
            .await
            .map_err(|e| EngineError::Load(format!("Engine loader task failed: {e}")))?;

        let engine = match engine {
            Ok(engine) => engine,
            Err(e) => {
                tracing::warn!(engine = %key, error = %e, "Engine construction failed");
                return Err(e);
            }
        };
        engine.set_resample_mode(key.mode);

        let load_time = started.elapsed();
        tracing::info!(
            engine = %key,
            device = %device,
            load_ms = load_time.as_millis() as u64,
            "Upscale engine loaded",
        );
        Ok(Arc::new(EngineHandle::new(key, device, load_time, engine)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
