use tracing::info;

use crate::error::{Result, TrialError};
use crate::source::TableSource;
use crate::transform::{TrialDataTransformer, TransformOutput};

/// Holds the last transformation result until it is invalidated.
pub struct TrialRepository<S: TableSource> {
    source: S,
    transformer: TrialDataTransformer,
    cached: Option<TransformOutput>,
}

impl<S: TableSource> TrialRepository<S> {
    pub fn new(source: S, transformer: TrialDataTransformer) -> Self {
        Self {
            source,
            transformer,
            cached: None,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch every table, transform and replace the cache.
    ///
    /// On error the previous cache is kept.
    pub fn load(&mut self) -> Result<&TransformOutput> {
        let tables = self.source.fetch_all()?;
        let output = self.transformer.transform(&tables)?;
        info!(
            rows = output.treated.height(),
            skipped_steps = output.report.skipped_steps.len(),
            "trial data loaded"
        );
        Ok(self.cached.insert(output))
    }

    /// Cached output, loading on a miss.
    pub fn get(&mut self) -> Result<&TransformOutput> {
        if self.cached.is_none() {
            return self.load();
        }
        self.cached
            .as_ref()
            .ok_or_else(|| TrialError::NotLoaded("trial data".to_string()))
    }

    pub fn cached(&self) -> Option<&TransformOutput> {
        self.cached.as_ref()
    }

    pub fn invalidate(&mut self) {
        if self.cached.take().is_some() {
            info!("trial data cache invalidated");
        }
    }
}
