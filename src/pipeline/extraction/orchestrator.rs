use super::ocr::join_fragments;
use super::preprocess::ImagePreprocessor;
use super::types::{OcrEngine, TextExtractor};
use super::ExtractionError;

/// Prescription image → text: binarize, OCR, join fragments.
///
/// Single attempt. Preprocessing or OCR failure fails the request.
pub struct PrescriptionTextExtractor {
    preprocessor: Box<dyn ImagePreprocessor>,
    ocr: Box<dyn OcrEngine>,
}

impl PrescriptionTextExtractor {
    pub fn new(preprocessor: Box<dyn ImagePreprocessor>, ocr: Box<dyn OcrEngine>) -> Self {
        Self { preprocessor, ocr }
    }
}

impl TextExtractor for PrescriptionTextExtractor {
    fn extract(&self, image_bytes: &[u8]) -> Result<String, ExtractionError> {
        let _span =
            tracing::info_span!("extract_prescription_text", input_size = image_bytes.len())
                .entered();

        let prepared = self.preprocessor.preprocess(image_bytes)?;
        let fragments = self.ocr.recognize(&prepared.png_bytes)?;
        let text = join_fragments(&fragments);

        tracing::info!(
            width = prepared.width,
            height = prepared.height,
            fragments = fragments.len(),
            text_len = text.len(),
            "Prescription text extracted"
        );
        Ok(text)
    }
}
