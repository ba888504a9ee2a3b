use serde::Serialize;

/// All errors surfaced by the copilot backend.
#[derive(Debug, thiserror::Error)]
pub enum CopilotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Gemini API error (HTTP {status}): {message}")]
    Ai { status: u16, message: String },

    #[error("Gemini response did not match the strategy schema: {0}")]
    MalformedStrategy(String),

    #[error("No Gemini API key configured (set apiKey in config.json or GEMINI_API_KEY)")]
    MissingApiKey,

    #[error("{0}")]
    Custom(String),
}

// Tauri requires error types to implement Serialize for IPC transport.
impl Serialize for CopilotError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CopilotError>;
