use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a fresh record id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current time as epoch seconds.
pub fn now_epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Pending,
    Approved,
    Revoked,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Pending => "pending",
            InviteStatus::Approved => "approved",
            InviteStatus::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(InviteStatus::Pending),
            "approved" => Some(InviteStatus::Approved),
            "revoked" => Some(InviteStatus::Revoked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

/// Lifecycle of a voice profile: uploaded -> training -> ready | failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceStatus {
    Uploaded,
    Training,
    Ready,
    Failed,
}

impl VoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceStatus::Uploaded => "uploaded",
            VoiceStatus::Training => "training",
            VoiceStatus::Ready => "ready",
            VoiceStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(VoiceStatus::Uploaded),
            "training" => Some(VoiceStatus::Training),
            "ready" => Some(VoiceStatus::Ready),
            "failed" => Some(VoiceStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VoiceStatus::Ready | VoiceStatus::Failed)
    }
}

/// Lifecycle of a generation job: queued -> processing -> complete | failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "complete" => Some(JobStatus::Complete),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub invite_status: InviteStatus,
    pub role: Role,
    pub created_at: i64,
    pub updated_at: i64,
}

impl User {
    pub fn is_approved(&self) -> bool {
        self.invite_status == InviteStatus::Approved
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin && self.is_approved()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceProfile {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub audio_path: String,
    pub status: VoiceStatus,
    pub provider_job_id: Option<String>,
    pub error_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Synthesis control parameters forwarded to the cloning provider.
///
/// Ranges follow the provider UI: exaggeration 0.25-2.0, pace (CFG weight)
/// 0.2-1.0, temperature 0.05-5.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GenerationParams {
    pub exaggeration: f64,
    pub pace: f64,
    pub temperature: f64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            exaggeration: 0.5,
            pace: 0.5,
            temperature: 0.8,
        }
    }
}

impl GenerationParams {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.25..=2.0).contains(&self.exaggeration) {
            return Err(format!(
                "exaggeration must be between 0.25 and 2.0 (got {})",
                self.exaggeration
            ));
        }
        if !(0.2..=1.0).contains(&self.pace) {
            return Err(format!(
                "pace must be between 0.2 and 1.0 (got {})",
                self.pace
            ));
        }
        if !(0.05..=5.0).contains(&self.temperature) {
            return Err(format!(
                "temperature must be between 0.05 and 5.0 (got {})",
                self.temperature
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationJob {
    pub id: String,
    pub user_id: String,
    pub voice_id: String,
    pub text: String,
    pub params: GenerationParams,
    pub status: JobStatus,
    pub provider_job_id: Option<String>,
    pub output_path: Option<String>,
    pub error_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for s in [
            VoiceStatus::Uploaded,
            VoiceStatus::Training,
            VoiceStatus::Ready,
            VoiceStatus::Failed,
        ] {
            assert_eq!(VoiceStatus::parse(s.as_str()), Some(s));
        }
        for s in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Complete,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(VoiceStatus::parse("bogus"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(VoiceStatus::Ready.is_terminal());
        assert!(VoiceStatus::Failed.is_terminal());
        assert!(!VoiceStatus::Uploaded.is_terminal());
        assert!(!VoiceStatus::Training.is_terminal());
        assert!(JobStatus::Complete.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
    }

    #[test]
    fn test_params_validation() {
        assert!(GenerationParams::default().validate().is_ok());

        let mut p = GenerationParams::default();
        p.exaggeration = 3.0;
        assert!(p.validate().is_err());

        let mut p = GenerationParams::default();
        p.pace = 0.0;
        assert!(p.validate().is_err());

        let mut p = GenerationParams::default();
        p.temperature = 10.0;
        assert!(p.validate().is_err());
    }
}
