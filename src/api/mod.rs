pub mod handlers;
pub mod routes;

use serde::{Deserialize, Serialize};

use crate::registry::{GenerationJob, GenerationParams, JobStatus, User, VoiceProfile};

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub voice_id: String,
    pub text: String,
    pub exaggeration: Option<f64>,
    pub pace: Option<f64>,
    pub temperature: Option<f64>,
}

impl GenerateRequest {
    /// Resolve control parameters, filling defaults for omitted fields.
    pub fn params(&self) -> GenerationParams {
        let defaults = GenerationParams::default();
        GenerationParams {
            exaggeration: self.exaggeration.unwrap_or(defaults.exaggeration),
            pace: self.pace.unwrap_or(defaults.pace),
            temperature: self.temperature.unwrap_or(defaults.temperature),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<User>,
}

#[derive(Debug, Serialize)]
pub struct VoicesResponse {
    pub voices: Vec<VoiceProfile>,
}

/// A generation job as reported to clients, with a download link once the
/// output audio exists.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    #[serde(flatten)]
    pub job: GenerationJob,
    pub audio_url: Option<String>,
}

impl From<GenerationJob> for JobResponse {
    fn from(job: GenerationJob) -> Self {
        let audio_url = (job.status == JobStatus::Complete && job.output_path.is_some())
            .then(|| format!("/api/audio/{}", job.id));
        Self { job, audio_url }
    }
}

/// Completion notification posted by the cloning provider.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub event_type: String,
    pub job_id: String,
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
