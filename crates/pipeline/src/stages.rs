//! Chains magnification stages and accounts for their progress.
//!
//! Stage `i` of `N` owns the progress sub-range `[i/N, (i+1)/N)`. Its engine
//! is acquired from the cache just before it runs, so a long job never pins
//! engines it has not reached yet. Stage outputs feed the next stage
//! unchanged: the raster type already preserves the channel layout, so a
//! transparent intermediate stays transparent and the final stage's layout
//! decides whether the result carries alpha.

use std::sync::Arc;

use upscaler_core::error::CoreError;
use upscaler_core::progress::{ProgressRange, ProgressSink, ScaledProgress};
use upscaler_core::raster::RasterImage;
use upscaler_core::types::{ResampleMode, Scale};
use upscaler_engine::{dispatcher, EngineCache, EngineKey};

use crate::error::PipelineError;

/// Message reported at the upper bound of a finished stage.
pub fn stage_completed_message(scale: Scale) -> String {
    format!("Completed scale x{scale}")
}

/// Runs ordered scale stages against the shared [`EngineCache`].
#[derive(Clone)]
pub struct PipelineRunner {
    cache: Arc<EngineCache>,
}

impl PipelineRunner {
    pub fn new(cache: Arc<EngineCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<EngineCache> {
        &self.cache
    }

    /// Run every stage in order, returning the final raster.
    ///
    /// Transforms execute on the blocking pool; `progress` receives global
    /// fractions in `[0, 1]`.
    pub async fn run(
        &self,
        scales: &[Scale],
        mode: ResampleMode,
        image: RasterImage,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<RasterImage, PipelineError> {
        if scales.is_empty() {
            return Err(CoreError::Validation("Pipeline needs at least one stage".into()).into());
        }

        let total = scales.len();
        let mut current = image;
        for (index, &scale) in scales.iter().enumerate() {
            let range = ProgressRange::for_stage(index, total);
            let handle = self.cache.acquire(EngineKey::new(scale, mode)).await?;

            tracing::debug!(
                stage = index + 1,
                total,
                engine = %handle.key(),
                width = current.width(),
                height = current.height(),
                "Running upscale stage",
            );

            let sink = Arc::clone(&progress);
            let input = current;
            current = tokio::task::spawn_blocking(move || {
                let stage_progress = ScaledProgress::new(sink.as_ref(), range);
                dispatcher::apply(handle.engine(), &input, &stage_progress)
            })
            .await??;

            progress.report(range.end, &stage_completed_message(scale));
        }
        Ok(current)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
