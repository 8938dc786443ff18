use super::types::OcrEngine;
use super::ExtractionError;

/// Join recognized fragments with single spaces, dropping blanks.
pub fn join_fragments<S: AsRef<str>>(fragments: &[S]) -> String {
    fragments
        .iter()
        .map(|f| f.as_ref().trim())
        .filter(|f| !f.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Mock OCR engine for unit testing without a model.
pub struct MockOcrEngine {
    fragments: Vec<String>,
    fail: bool,
}

impl MockOcrEngine {
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fragments: Vec::new(),
            fail: true,
        }
    }
}

impl OcrEngine for MockOcrEngine {
    fn recognize(&self, _png_bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
        if self.fail {
            return Err(ExtractionError::OcrProcessing("Mock OCR failure".into()));
        }
        Ok(self.fragments.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_joined_with_single_spaces() {
        let text = join_fragments(&["  Tab. Paracetamol ", "500mg", "", "   ", "1-0-1"]);
        assert_eq!(text, "Tab. Paracetamol 500mg 1-0-1");
    }

    #[test]
    fn no_fragments_is_empty_text() {
        let empty: [&str; 0] = [];
        assert_eq!(join_fragments(&empty), "");
    }

    #[test]
    fn mock_engine_returns_configured_fragments() {
        let engine = MockOcrEngine::new(&["Rx", "Amoxicillin"]);
        assert_eq!(engine.recognize(b"png").unwrap(), vec!["Rx", "Amoxicillin"]);
        assert!(MockOcrEngine::failing().recognize(b"png").is_err());
    }
}
