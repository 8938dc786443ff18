//! Vision OCR engine: reads a binarized prescription page via an Ollama vision model.
//!
//! The model is asked for a plain transcription, one output line per printed
//! or handwritten line. Lines become OCR fragments; no layout or confidence
//! is kept.

use std::sync::Arc;

use base64::Engine as _;

use super::types::OcrEngine;
use super::ExtractionError;
use crate::pipeline::structuring::types::VisionClient;
use crate::pipeline::structuring::StructuringError;

const OCR_SYSTEM_PROMPT: &str = "\
You are an OCR engine for medical prescriptions. Transcribe the visible text \
exactly as written. Do not summarize, interpret, translate, or add anything.";

const OCR_USER_PROMPT: &str = "\
Transcribe all text in this prescription image. Output one line of text per \
line in the image, in reading order, and nothing else.";

/// Production OCR engine backed by an Ollama vision model.
pub struct OllamaVisionOcr {
    vision_client: Arc<dyn VisionClient + Send + Sync>,
    model_name: String,
}

impl OllamaVisionOcr {
    pub fn new(vision_client: Arc<dyn VisionClient + Send + Sync>, model_name: &str) -> Self {
        Self {
            vision_client,
            model_name: model_name.to_string(),
        }
    }
}

impl OcrEngine for OllamaVisionOcr {
    fn recognize(&self, png_bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
        let _span = tracing::info_span!(
            "vision_ocr",
            model = %self.model_name,
            image_size = png_bytes.len(),
        )
        .entered();
        let start = std::time::Instant::now();

        let images = vec![base64::engine::general_purpose::STANDARD.encode(png_bytes)];
        let response = self
            .vision_client
            .chat_with_images(&self.model_name, OCR_USER_PROMPT, &images, Some(OCR_SYSTEM_PROMPT))
            .map_err(|e| match e {
                StructuringError::OllamaConnection(url) => ExtractionError::OcrConnection(url),
                other => ExtractionError::OcrProcessing(format!("Vision OCR failed: {other}")),
            })?;

        let fragments = split_fragments(&response);
        tracing::info!(
            elapsed_ms = %start.elapsed().as_millis(),
            fragments = fragments.len(),
            "Vision OCR complete"
        );
        Ok(fragments)
    }
}

/// One fragment per non-blank line; Markdown fences some models add are dropped.
fn split_fragments(response: &str) -> Vec<String> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("```"))
        .map(str::to_string)
        .collect()
}
