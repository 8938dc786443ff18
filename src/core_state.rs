//! Application state shared by every request.
//!
//! Built once at startup from `PipelineConfig` and handed around as
//! `Arc<CoreState>`. Components are owned here rather than living in
//! process-wide globals, so tests can assemble a state from doubles.

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::db::{self, SqliteDocumentStore};
use crate::pipeline::processor::{build_processor, PrescriptionProcessor, ProcessingError};
use crate::schedule_store::{ScheduleStore, ScheduleStoreError};

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    config: PipelineConfig,
    schedule: Arc<ScheduleStore>,
    documents: Arc<SqliteDocumentStore>,
    processor: PrescriptionProcessor,
}

impl CoreState {
    /// Open both stores and build the production pipeline.
    pub fn from_config(config: PipelineConfig) -> Result<Self, CoreError> {
        tracing::info!(
            schedule = %config.schedule_path.display(),
            database = %config.database_path.display(),
            "Initializing {} v{}",
            crate::config::APP_NAME,
            crate::config::APP_VERSION
        );

        let schedule = Arc::new(ScheduleStore::new(config.schedule_path.clone()));
        let documents = Arc::new(SqliteDocumentStore::open(&config.database_path)?);
        let processor =
            build_processor(&config, schedule.clone(), documents.clone(), documents.clone())?;

        Ok(Self {
            config,
            schedule,
            documents,
            processor,
        })
    }

    /// Assemble a state around an already-built processor (custom engines, tests).
    pub fn with_processor(
        config: PipelineConfig,
        schedule: Arc<ScheduleStore>,
        documents: Arc<SqliteDocumentStore>,
        processor: PrescriptionProcessor,
    ) -> Self {
        Self {
            config,
            schedule,
            documents,
            processor,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn schedule(&self) -> &ScheduleStore {
        &self.schedule
    }

    pub fn documents(&self) -> &SqliteDocumentStore {
        &self.documents
    }

    pub fn processor(&self) -> &PrescriptionProcessor {
        &self.processor
    }
}

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),

    #[error("Schedule store error: {0}")]
    ScheduleStore(#[from] ScheduleStoreError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error("User {0} is not registered")]
    UnknownUser(String),

    #[error("Background task failed: {0}")]
    TaskJoin(String),
}
