// THEORY:
// A single analysis is synchronous and CPU bound, and carries no state across
// images. The batch pipeline is therefore a plain fan-out: every image becomes
// one job on tokio's blocking pool, a semaphore caps how many run at once, and
// results are gathered back in submission order. A failing image produces an
// `Err` in its own slot and never disturbs the others.

use crate::error::{AnalysisError, Result};
use crate::pipeline::{AnalysisConfig, DamageAnalysisInput, DamageAnalyzer, DamageReport};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Configuration of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_concurrent_images: usize,
    pub analysis: AnalysisConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_images: num_cpus::get().max(1),
            analysis: AnalysisConfig::default(),
        }
    }
}

/// One image to analyze, identified by a caller-chosen name.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub name: String,
    pub input: DamageAnalysisInput,
}

#[derive(Debug)]
pub struct JobOutcome {
    pub name: String,
    pub result: Result<DamageReport>,
}

pub struct BatchAnalyzer {
    analyzer: Arc<DamageAnalyzer>,
    permits: Arc<Semaphore>,
    max_concurrent_images: usize,
}

impl BatchAnalyzer {
    pub fn new(config: BatchConfig) -> Result<Self> {
        if config.max_concurrent_images == 0 {
            return Err(AnalysisError::Config(
                "max_concurrent_images must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            analyzer: Arc::new(DamageAnalyzer::new(config.analysis)?),
            permits: Arc::new(Semaphore::new(config.max_concurrent_images)),
            max_concurrent_images: config.max_concurrent_images,
        })
    }

    pub fn max_concurrent_images(&self) -> usize {
        self.max_concurrent_images
    }

    /// Analyzes every job; outcomes come back in the order of `jobs`.
    pub async fn analyze_all(&self, jobs: Vec<AnalysisJob>) -> Vec<JobOutcome> {
        debug!(
            jobs = jobs.len(),
            max_concurrent = self.max_concurrent_images,
            "starting batch"
        );

        let tasks = jobs.into_iter().map(|job| {
            let analyzer = Arc::clone(&self.analyzer);
            let permits = Arc::clone(&self.permits);
            async move {
                let name = job.name.clone();
                let result = Self::run_job(analyzer, permits, job).await;
                if let Err(e) = &result {
                    warn!(image = %name, error = %e, "analysis failed");
                }
                JobOutcome { name, result }
            }
        });

        join_all(tasks).await
    }

    async fn run_job(
        analyzer: Arc<DamageAnalyzer>,
        permits: Arc<Semaphore>,
        job: AnalysisJob,
    ) -> Result<DamageReport> {
        let _permit = permits
            .acquire_owned()
            .await
            .map_err(|e| AnalysisError::Worker(e.to_string()))?;

        let name = job.name.clone();
        tokio::task::spawn_blocking(move || analyzer.analyze(&job.input))
            .await
            .map_err(|e| AnalysisError::Worker(format!("job {name} did not finish: {e}")))?
    }
}
