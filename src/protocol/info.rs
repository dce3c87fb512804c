//! # Capability Payload
//!
//! The `info` event answers `describe`. It is built once at startup from the
//! configured model id and shared read-only by every connection.

use crate::error::AppResult;
use crate::protocol::event::{to_data, Event, INFO_TYPE};
use serde::{Deserialize, Serialize};

pub const PROGRAM_NAME: &str = "candle-whisper";
pub const PROGRAM_DESCRIPTION: &str = "Whisper speech-to-text on Hugging Face Candle";

/// Language codes Whisper can transcribe.
pub const WHISPER_LANGUAGES: &[&str] = &[
    "af", "am", "ar", "as", "az", "ba", "be", "bg", "bn", "bo", "br", "bs", "ca", "cs", "cy",
    "da", "de", "el", "en", "es", "et", "eu", "fa", "fi", "fo", "fr", "gl", "gu", "ha", "haw",
    "he", "hi", "hr", "ht", "hu", "hy", "id", "is", "it", "ja", "jw", "ka", "kk", "km", "kn",
    "ko", "la", "lb", "ln", "lo", "lt", "lv", "mg", "mi", "mk", "ml", "mn", "mr", "ms", "mt",
    "my", "ne", "nl", "nn", "no", "oc", "pa", "pl", "ps", "pt", "ro", "ru", "sa", "sd", "si",
    "sk", "sl", "sn", "so", "sq", "sr", "su", "sv", "sw", "ta", "te", "tg", "th", "tk", "tl",
    "tr", "tt", "uk", "ur", "uz", "vi", "yi", "yo", "yue", "zh",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsrModel {
    pub name: String,
    pub description: Option<String>,
    pub attribution: Attribution,
    pub installed: bool,
    pub languages: Vec<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsrProgram {
    pub name: String,
    pub description: Option<String>,
    pub attribution: Attribution,
    pub installed: bool,
    pub version: Option<String>,
    pub models: Vec<AsrModel>,
}

/// Services offered by this server. Only `asr` is ever populated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub asr: Vec<AsrProgram>,

    #[serde(default)]
    pub tts: Vec<serde_json::Value>,

    #[serde(default)]
    pub handle: Vec<serde_json::Value>,

    #[serde(default)]
    pub intent: Vec<serde_json::Value>,

    #[serde(default)]
    pub wake: Vec<serde_json::Value>,
}

impl Info {
    /// Describe a single Whisper model served by this program.
    ///
    /// ## Parameters:
    /// - **model_id**: The configured model, reported verbatim as name and description
    /// - **version**: Program version (the crate version)
    pub fn for_model(model_id: &str, version: &str) -> Self {
        let model = AsrModel {
            name: model_id.to_string(),
            description: Some(model_id.to_string()),
            attribution: Attribution {
                name: "OpenAI Whisper".to_string(),
                url: "https://github.com/openai/whisper".to_string(),
            },
            installed: true,
            languages: WHISPER_LANGUAGES.iter().map(|l| l.to_string()).collect(),
            version: Some(version.to_string()),
        };

        Self {
            asr: vec![AsrProgram {
                name: PROGRAM_NAME.to_string(),
                description: Some(PROGRAM_DESCRIPTION.to_string()),
                attribution: Attribution {
                    name: "Hugging Face Candle".to_string(),
                    url: "https://github.com/huggingface/candle".to_string(),
                },
                installed: true,
                version: Some(version.to_string()),
                models: vec![model],
            }],
            ..Self::default()
        }
    }

    pub fn to_event(&self) -> AppResult<Event> {
        Ok(Event::new(INFO_TYPE).with_data(to_data(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_language_list() {
        assert_eq!(WHISPER_LANGUAGES.len(), 100);
        assert!(WHISPER_LANGUAGES.contains(&"en"));
        assert!(WHISPER_LANGUAGES.contains(&"yue"));
    }

    #[test]
    fn test_info_event_shape() {
        let event = Info::for_model("openai/whisper-tiny", "0.1.0")
            .to_event()
            .unwrap();

        assert!(event.is_type(INFO_TYPE));
        assert_eq!(event.data.get("tts"), Some(&json!([])));
        assert_eq!(event.data.get("wake"), Some(&json!([])));

        let asr = &event.data["asr"][0];
        assert_eq!(asr["name"], json!(PROGRAM_NAME));
        assert_eq!(asr["installed"], json!(true));
        assert_eq!(asr["models"][0]["name"], json!("openai/whisper-tiny"));
        assert_eq!(asr["models"][0]["description"], json!("openai/whisper-tiny"));
        assert_eq!(asr["models"][0]["attribution"]["name"], json!("OpenAI Whisper"));
        assert_eq!(asr["models"][0]["languages"].as_array().unwrap().len(), 100);
    }
}
