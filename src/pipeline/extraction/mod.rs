pub mod ocr;
pub mod orchestrator;
pub mod preprocess;
pub mod types;
pub mod vision_ocr;

pub use ocr::*;
pub use orchestrator::*;
pub use preprocess::*;
pub use types::*;
pub use vision_ocr::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("OCR service unreachable at {0}")]
    OcrConnection(String),
}
