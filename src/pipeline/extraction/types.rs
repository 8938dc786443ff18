use super::ExtractionError;

/// OCR capability: recognizes text on a binarized page image.
///
/// Input is PNG bytes. Output is the recognized fragments in reading order,
/// without geometry or confidence.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, png_bytes: &[u8]) -> Result<Vec<String>, ExtractionError>;
}

/// Image bytes in, free text out.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, image_bytes: &[u8]) -> Result<String, ExtractionError>;
}
