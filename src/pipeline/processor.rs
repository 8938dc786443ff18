//! Prescription processing: the two entry points the transport layer calls.
//!
//! image → extract text → prompt → LLM → reconcile
//! transcript →            prompt → LLM → reconcile
//!
//! All engines come in through traits so the whole flow runs against mocks.

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::db::{DatabaseError, MedicineLedger, MemberDirectory};
use crate::models::MealTimes;
use crate::pipeline::extraction::orchestrator::PrescriptionTextExtractor;
use crate::pipeline::extraction::preprocess::BinarizingPreprocessor;
use crate::pipeline::extraction::types::TextExtractor;
use crate::pipeline::extraction::vision_ocr::OllamaVisionOcr;
use crate::pipeline::extraction::ExtractionError;
use crate::pipeline::reconcile::{resolve_member_name, ReconcileReport, Reconciler, StoreFailure};
use crate::pipeline::structuring::ollama::OllamaClient;
use crate::pipeline::structuring::parser::{parse_prescription, ParseFailure, StructuredParser};
use crate::pipeline::structuring::prompt::{build_prescription_prompt, InputModality};
use crate::pipeline::structuring::StructuringError;
use crate::schedule_store::{ScheduleStore, ScheduleStoreError};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that fail a prescription request.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Error parsing the prescription: {0}")]
    Format(String),

    #[error("Invalid prescription data: {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Structuring failed: {0}")]
    Structuring(#[from] StructuringError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Schedule store error: {0}")]
    ScheduleStore(#[from] ScheduleStoreError),

    #[error("Failed to save {} schedule write(s)", .0.len())]
    Persistence(Vec<StoreFailure>),
}

/// Coarse error category for callers mapping failures to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Model output was not JSON.
    Format,
    /// Model output had no usable medicines, or input was unusable.
    Validation,
    /// Unknown member.
    NotFound,
    /// OCR or LLM capability failed.
    ExternalService,
    /// A store could not be read or written.
    Storage,
}

impl ProcessingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Format(_) => ErrorKind::Format,
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Extraction(ExtractionError::ImageProcessing(_)) => ErrorKind::Validation,
            Self::Extraction(_) | Self::Structuring(_) => ErrorKind::ExternalService,
            Self::Database(DatabaseError::InvalidInput(_)) => ErrorKind::Validation,
            Self::Database(_) | Self::ScheduleStore(_) | Self::Persistence(_) => ErrorKind::Storage,
        }
    }

    /// Message suitable for showing to the person who submitted the prescription.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Format => {
                "The prescription could not be read. Please try again with a clearer photo or recording.".into()
            }
            ErrorKind::Validation => match self {
                Self::Extraction(_) => "The uploaded file is not a supported image.".into(),
                _ => "No medicines could be found in the prescription.".into(),
            },
            ErrorKind::NotFound => self.to_string(),
            ErrorKind::ExternalService => {
                "The prescription reader is unavailable right now. Please try again later.".into()
            }
            ErrorKind::Storage => "The schedule could not be saved. Please try again.".into(),
        }
    }
}

impl From<ParseFailure> for ProcessingError {
    fn from(failure: ParseFailure) -> Self {
        match failure {
            ParseFailure::Format(detail) => Self::Format(detail),
            ParseFailure::Validation(detail) => Self::Validation(detail),
        }
    }
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

/// Runs prescriptions through extraction, structuring and reconciliation.
pub struct PrescriptionProcessor {
    extractor: Box<dyn TextExtractor>,
    parser: StructuredParser,
    schedule: Arc<ScheduleStore>,
    directory: Arc<dyn MemberDirectory>,
    ledger: Arc<dyn MedicineLedger>,
}

impl PrescriptionProcessor {
    pub fn new(
        extractor: Box<dyn TextExtractor>,
        parser: StructuredParser,
        schedule: Arc<ScheduleStore>,
        directory: Arc<dyn MemberDirectory>,
        ledger: Arc<dyn MedicineLedger>,
    ) -> Self {
        Self {
            extractor,
            parser,
            schedule,
            directory,
            ledger,
        }
    }

    /// Photographed or scanned prescription.
    pub fn process_image_prescription(
        &self,
        user_key: &str,
        member_id: &str,
        image_bytes: &[u8],
    ) -> Result<ReconcileReport, ProcessingError> {
        let _span = tracing::info_span!(
            "process_image_prescription",
            user = user_key,
            member_id,
            image_size = image_bytes.len(),
        )
        .entered();

        let (member_name, meal_times) = self.resolve_member(user_key, member_id)?;

        let extracted_text = self.extractor.extract(image_bytes)?;
        tracing::info!(text_len = extracted_text.len(), "Prescription text extracted");
        tracing::debug!(text = %extracted_text, "Extracted text");

        self.structure_and_reconcile(
            &extracted_text,
            InputModality::Image,
            &meal_times,
            user_key,
            member_id,
            &member_name,
        )
    }

    /// Transcript of a dictated prescription.
    pub fn process_audio_prescription(
        &self,
        user_key: &str,
        member_id: &str,
        transcript: &str,
    ) -> Result<ReconcileReport, ProcessingError> {
        let _span = tracing::info_span!(
            "process_audio_prescription",
            user = user_key,
            member_id,
            transcript_len = transcript.len(),
        )
        .entered();

        let (member_name, meal_times) = self.resolve_member(user_key, member_id)?;

        self.structure_and_reconcile(
            transcript,
            InputModality::Audio,
            &meal_times,
            user_key,
            member_id,
            &member_name,
        )
    }

    /// Member name from the directory, meal times from the schedule file.
    fn resolve_member(
        &self,
        user_key: &str,
        member_id: &str,
    ) -> Result<(String, MealTimes), ProcessingError> {
        let member_name = resolve_member_name(self.directory.as_ref(), member_id)?;
        let meal_times = self
            .schedule
            .meal_times(user_key, &member_name)?
            .ok_or_else(|| {
                ProcessingError::NotFound(format!(
                    "Family member {member_name} is not registered under {user_key}"
                ))
            })?;
        Ok((member_name, meal_times))
    }

    fn structure_and_reconcile(
        &self,
        text: &str,
        modality: InputModality,
        meal_times: &MealTimes,
        user_key: &str,
        member_id: &str,
        member_name: &str,
    ) -> Result<ReconcileReport, ProcessingError> {
        let prompt = build_prescription_prompt(meal_times, modality);
        let raw_output = self.parser.parse(text, &prompt)?;
        tracing::info!(output_len = raw_output.len(), "Parsed prescription information received");
        tracing::debug!(output = %raw_output, "Model output");

        let parsed = parse_prescription(&raw_output)?;
        Reconciler::new(&self.schedule, self.directory.as_ref(), self.ledger.as_ref())
            .apply(&parsed, user_key, member_id, member_name)
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Build a processor with production engines: binarizing preprocessor and
/// Ollama vision OCR for images, Ollama chat for structuring.
pub fn build_processor(
    config: &PipelineConfig,
    schedule: Arc<ScheduleStore>,
    directory: Arc<dyn MemberDirectory>,
    ledger: Arc<dyn MedicineLedger>,
) -> Result<PrescriptionProcessor, ProcessingError> {
    let ollama = Arc::new(OllamaClient::new(&config.ollama_url, config.request_timeout_secs)?);
    tracing::info!(
        url = %ollama.base_url(),
        text_model = %config.text_model,
        vision_model = %config.vision_model,
        "Prescription processor using Ollama"
    );

    let extractor = PrescriptionTextExtractor::new(
        Box::new(BinarizingPreprocessor::new(config.threshold)),
        Box::new(OllamaVisionOcr::new(ollama.clone(), &config.vision_model)),
    );
    let parser = StructuredParser::new(ollama, &config.text_model, config.generation.clone());

    Ok(PrescriptionProcessor::new(
        Box::new(extractor),
        parser,
        schedule,
        directory,
        ledger,
    ))
}
