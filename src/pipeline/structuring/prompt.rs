use crate::models::MealTimes;

/// Assistant turn seeded after the instruction prompt, before the
/// prescription text is sent.
pub const ASSISTANT_ACKNOWLEDGMENT: &str =
    "Ready to extract prescription details. Please provide the text.";

/// The only output shape the reconciler accepts.
pub const PRESCRIPTION_SCHEMA: &str = r#"{
    "medicines": [
        {
            "name": "string",
            "dosage": "string",
            "times": ["HH:MM"]
        }
    ],
    "duration": "string",
    "advice": "string",
    "follow_up": "string"
}"#;

/// Where the prescription text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputModality {
    /// Text recognized from a photographed or scanned prescription.
    Image,
    /// Transcript of a dictated prescription.
    Audio,
}

impl InputModality {
    fn input_description(self) -> &'static str {
        match self {
            Self::Image => "text extracted from a prescription using OCR",
            Self::Audio => "transcribed text of an audio recording of a medical prescription",
        }
    }

    fn misreading_example(self) -> &'static str {
        match self {
            Self::Image => "OCR may read \"Moming\" where the prescription says \"Morning\"",
            Self::Audio => "the transcript may contain \"mourning\" where \"morning\" was said",
        }
    }
}

/// Build the instruction prompt for one family member.
///
/// Meal times are embedded so the model can turn "after breakfast" into an
/// absolute time.
pub fn build_prescription_prompt(meal_times: &MealTimes, modality: InputModality) -> String {
    format!(
        r#"You are a medical assistant AI. You will be provided with {input}.
Extract the prescribed medicines and return them as JSON that strictly follows this schema, and nothing else:
{schema}

Ensure every time is in 24-hour format (HH:MM, with leading zeros). Provide the response only as JSON.
Correct misreadings in names and dosages at your discretion; for example, {example}.
Resolve times relative to meals (before or after breakfast, lunch, dinner) using the meal times below.

Meal Times: {meals}
"#,
        input = modality.input_description(),
        schema = PRESCRIPTION_SCHEMA,
        example = modality.misreading_example(),
        meals = meal_times.describe(),
    )
}
