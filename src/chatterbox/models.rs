use serde::{Deserialize, Serialize};

/// Request body for the provider's `/tts` endpoint.
#[derive(Debug, Serialize)]
pub struct TtsPayload<'a> {
    pub voice_id: &'a str,
    pub text: &'a str,
    pub exaggeration: f64,
    pub pace: f64,
    pub temperature: f64,
    pub output_format: &'a str,
}

/// Job handle returned when the provider queues work asynchronously.
#[derive(Debug, Deserialize)]
pub struct ProviderJob {
    pub job_id: String,
}

/// Result of a generation call: audio right away, or a handle that resolves
/// through the webhook receiver later.
#[derive(Debug)]
pub enum TtsOutcome {
    Audio(Vec<u8>),
    Pending { provider_job_id: String },
}
