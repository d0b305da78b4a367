//! Voice/job registry backed by a single SQLite database file.
//!
//! Every lifecycle mutation is a single guarded UPDATE: the expected current
//! status is part of the WHERE clause, so a replayed or out-of-order mutation
//! affects zero rows and is reported as a conflict without touching state.

pub mod schema;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::AppError;

pub use types::{
    GenerationJob, GenerationParams, InviteStatus, JobStatus, Role, User, VoiceProfile,
    VoiceStatus,
};

use types::{new_id, now_epoch_secs};

/// Registry of users, voice profiles and generation jobs.
///
/// Thread-safe via an internal `Mutex<Connection>`. All writes are
/// serialized; queries are small enough that contention is not a concern.
pub struct Registry {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl Registry {
    /// Open (or create) the registry database at `path`, applying the schema.
    pub fn open(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        schema::apply_schema(&conn)?;
        Ok(Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    /// In-memory registry for tests.
    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()?;
        schema::apply_schema(&conn)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.conn
            .lock()
            .map_err(|_| AppError::Database("registry lock poisoned".to_string()))
    }

    // --- users ---

    /// Create a user in `pending` invite status.
    pub fn create_user(&self, username: &str) -> Result<User, AppError> {
        self.insert_user(username, Role::User, InviteStatus::Pending)
    }

    /// Make sure an approved admin account with this username exists.
    pub fn ensure_admin(&self, username: &str) -> Result<User, AppError> {
        if let Some(user) = self.find_user_by_username(username)? {
            return Ok(user);
        }
        self.insert_user(username, Role::Admin, InviteStatus::Approved)
    }

    fn insert_user(
        &self,
        username: &str,
        role: Role,
        invite_status: InviteStatus,
    ) -> Result<User, AppError> {
        let conn = self.lock()?;
        let now = now_epoch_secs();
        let user = User {
            id: new_id(),
            username: username.to_string(),
            invite_status,
            role,
            created_at: now,
            updated_at: now,
        };
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO users (id, username, invite_status, role, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id,
                user.username,
                user.invite_status.as_str(),
                user.role.as_str(),
                user.created_at,
                user.updated_at
            ],
        )?;
        if inserted == 0 {
            return Err(AppError::Conflict(format!(
                "Username '{}' is already taken",
                username
            )));
        }
        Ok(user)
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let conn = self.lock()?;
        let user = conn
            .query_row(
                "SELECT id, username, invite_status, role, created_at, updated_at
                 FROM users WHERE id = ?1",
                [id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let conn = self.lock()?;
        let user = conn
            .query_row(
                "SELECT id, username, invite_status, role, created_at, updated_at
                 FROM users WHERE username = ?1",
                [username],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn list_users(&self) -> Result<Vec<User>, AppError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, username, invite_status, role, created_at, updated_at
             FROM users ORDER BY created_at",
        )?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Approve a pending user. Approving twice, or approving a revoked
    /// account, is a conflict.
    pub fn approve_user(&self, id: &str) -> Result<User, AppError> {
        let changed = {
            let conn = self.lock()?;
            conn.execute(
                "UPDATE users SET invite_status = 'approved', updated_at = ?1
                 WHERE id = ?2 AND invite_status = 'pending'",
                params![now_epoch_secs(), id],
            )?
        };
        self.user_after_transition(id, changed, "user is not pending approval")
    }

    /// Soft-revoke a user. The row stays; only the status flips.
    pub fn revoke_user(&self, id: &str) -> Result<User, AppError> {
        let changed = {
            let conn = self.lock()?;
            conn.execute(
                "UPDATE users SET invite_status = 'revoked', updated_at = ?1
                 WHERE id = ?2 AND invite_status != 'revoked'",
                params![now_epoch_secs(), id],
            )?
        };
        self.user_after_transition(id, changed, "user is already revoked")
    }

    fn user_after_transition(
        &self,
        id: &str,
        changed: usize,
        conflict_msg: &str,
    ) -> Result<User, AppError> {
        match self.get_user(id)? {
            None => Err(AppError::NotFound(format!("Unknown user id '{}'", id))),
            Some(user) if changed == 0 => Err(AppError::Conflict(format!(
                "{} (user '{}')",
                conflict_msg, user.username
            ))),
            Some(user) => Ok(user),
        }
    }

    // --- voice profiles ---

    /// Record a freshly uploaded reference audio as a profile in `uploaded`.
    pub fn create_voice(
        &self,
        user_id: &str,
        name: &str,
        audio_path: &str,
    ) -> Result<VoiceProfile, AppError> {
        let conn = self.lock()?;
        let now = now_epoch_secs();
        let voice = VoiceProfile {
            id: new_id(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            audio_path: audio_path.to_string(),
            status: VoiceStatus::Uploaded,
            provider_job_id: None,
            error_reason: None,
            created_at: now,
            updated_at: now,
        };
        conn.execute(
            "INSERT INTO voice_profiles (id, user_id, name, audio_path, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                voice.id,
                voice.user_id,
                voice.name,
                voice.audio_path,
                voice.status.as_str(),
                voice.created_at,
                voice.updated_at
            ],
        )?;
        Ok(voice)
    }

    pub fn get_voice(&self, id: &str) -> Result<Option<VoiceProfile>, AppError> {
        let conn = self.lock()?;
        let voice = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_VOICE),
                [id],
                row_to_voice,
            )
            .optional()?;
        Ok(voice)
    }

    pub fn find_voice_by_provider_job(
        &self,
        provider_job_id: &str,
    ) -> Result<Option<VoiceProfile>, AppError> {
        let conn = self.lock()?;
        let voice = conn
            .query_row(
                &format!("{} WHERE provider_job_id = ?1", SELECT_VOICE),
                [provider_job_id],
                row_to_voice,
            )
            .optional()?;
        Ok(voice)
    }

    pub fn list_voices_for_user(&self, user_id: &str) -> Result<Vec<VoiceProfile>, AppError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare(&format!("{} WHERE user_id = ?1 ORDER BY created_at", SELECT_VOICE))?;
        let voices = stmt
            .query_map([user_id], row_to_voice)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(voices)
    }

    /// uploaded -> training, recording the provider's training job handle.
    pub fn mark_training(
        &self,
        voice_id: &str,
        provider_job_id: &str,
    ) -> Result<VoiceProfile, AppError> {
        let changed = {
            let conn = self.lock()?;
            conn.execute(
                "UPDATE voice_profiles
                 SET status = 'training', provider_job_id = ?1, updated_at = ?2
                 WHERE id = ?3 AND status = 'uploaded'",
                params![provider_job_id, now_epoch_secs(), voice_id],
            )?
        };
        self.voice_after_transition(voice_id, changed)
    }

    /// Pre-terminal -> ready. Terminal profiles never transition again.
    pub fn mark_ready(&self, voice_id: &str) -> Result<VoiceProfile, AppError> {
        let changed = {
            let conn = self.lock()?;
            conn.execute(
                "UPDATE voice_profiles
                 SET status = 'ready', error_reason = NULL, updated_at = ?1
                 WHERE id = ?2 AND status IN ('uploaded', 'training')",
                params![now_epoch_secs(), voice_id],
            )?
        };
        self.voice_after_transition(voice_id, changed)
    }

    /// Pre-terminal -> failed, with a stored reason.
    pub fn mark_voice_failed(
        &self,
        voice_id: &str,
        reason: &str,
    ) -> Result<VoiceProfile, AppError> {
        let changed = {
            let conn = self.lock()?;
            conn.execute(
                "UPDATE voice_profiles
                 SET status = 'failed', error_reason = ?1, updated_at = ?2
                 WHERE id = ?3 AND status IN ('uploaded', 'training')",
                params![reason, now_epoch_secs(), voice_id],
            )?
        };
        self.voice_after_transition(voice_id, changed)
    }

    fn voice_after_transition(
        &self,
        voice_id: &str,
        changed: usize,
    ) -> Result<VoiceProfile, AppError> {
        match self.get_voice(voice_id)? {
            None => Err(AppError::NotFound(format!(
                "Unknown voice id '{}'",
                voice_id
            ))),
            Some(voice) if changed == 0 => Err(AppError::Conflict(format!(
                "Voice '{}' is already {}",
                voice_id,
                voice.status.as_str()
            ))),
            Some(voice) => Ok(voice),
        }
    }

    /// Delete a profile row. The caller is responsible for removing the
    /// stored reference audio first.
    pub fn delete_voice(&self, voice_id: &str) -> Result<(), AppError> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM voice_profiles WHERE id = ?1", [voice_id])?;
        if deleted == 0 {
            return Err(AppError::NotFound(format!(
                "Unknown voice id '{}'",
                voice_id
            )));
        }
        Ok(())
    }

    // --- generation jobs ---

    /// Queue a generation job. The target voice must be `ready`.
    pub fn create_job(
        &self,
        user_id: &str,
        voice_id: &str,
        text: &str,
        params: GenerationParams,
    ) -> Result<GenerationJob, AppError> {
        let voice = self
            .get_voice(voice_id)?
            .ok_or_else(|| AppError::NotFound(format!("Unknown voice id '{}'", voice_id)))?;
        if voice.status != VoiceStatus::Ready {
            return Err(AppError::Conflict(format!(
                "Voice '{}' is {}, not ready",
                voice_id,
                voice.status.as_str()
            )));
        }

        let conn = self.lock()?;
        let now = now_epoch_secs();
        let job = GenerationJob {
            id: new_id(),
            user_id: user_id.to_string(),
            voice_id: voice_id.to_string(),
            text: text.to_string(),
            params,
            status: JobStatus::Queued,
            provider_job_id: None,
            output_path: None,
            error_reason: None,
            created_at: now,
            updated_at: now,
        };
        conn.execute(
            "INSERT INTO generation_jobs
             (id, user_id, voice_id, text, exaggeration, pace, temperature, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                job.id,
                job.user_id,
                job.voice_id,
                job.text,
                job.params.exaggeration,
                job.params.pace,
                job.params.temperature,
                job.status.as_str(),
                job.created_at,
                job.updated_at
            ],
        )?;
        Ok(job)
    }

    pub fn get_job(&self, id: &str) -> Result<Option<GenerationJob>, AppError> {
        let conn = self.lock()?;
        let job = conn
            .query_row(&format!("{} WHERE id = ?1", SELECT_JOB), [id], row_to_job)
            .optional()?;
        Ok(job)
    }

    pub fn find_job_by_provider_job(
        &self,
        provider_job_id: &str,
    ) -> Result<Option<GenerationJob>, AppError> {
        let conn = self.lock()?;
        let job = conn
            .query_row(
                &format!("{} WHERE provider_job_id = ?1", SELECT_JOB),
                [provider_job_id],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    /// queued -> processing, recording the provider's async job handle.
    pub fn mark_processing(
        &self,
        job_id: &str,
        provider_job_id: &str,
    ) -> Result<GenerationJob, AppError> {
        let changed = {
            let conn = self.lock()?;
            conn.execute(
                "UPDATE generation_jobs
                 SET status = 'processing', provider_job_id = ?1, updated_at = ?2
                 WHERE id = ?3 AND status = 'queued'",
                params![provider_job_id, now_epoch_secs(), job_id],
            )?
        };
        self.job_after_transition(job_id, changed)
    }

    /// Pre-terminal -> complete. The one and only terminal transition;
    /// replays affect zero rows and surface as conflicts.
    pub fn complete_job(
        &self,
        job_id: &str,
        output_path: &str,
    ) -> Result<GenerationJob, AppError> {
        let changed = {
            let conn = self.lock()?;
            conn.execute(
                "UPDATE generation_jobs
                 SET status = 'complete', output_path = ?1, updated_at = ?2
                 WHERE id = ?3 AND status IN ('queued', 'processing')",
                params![output_path, now_epoch_secs(), job_id],
            )?
        };
        self.job_after_transition(job_id, changed)
    }

    /// Pre-terminal -> failed, with a stored reason.
    pub fn fail_job(&self, job_id: &str, reason: &str) -> Result<GenerationJob, AppError> {
        let changed = {
            let conn = self.lock()?;
            conn.execute(
                "UPDATE generation_jobs
                 SET status = 'failed', error_reason = ?1, updated_at = ?2
                 WHERE id = ?3 AND status IN ('queued', 'processing')",
                params![reason, now_epoch_secs(), job_id],
            )?
        };
        self.job_after_transition(job_id, changed)
    }

    fn job_after_transition(
        &self,
        job_id: &str,
        changed: usize,
    ) -> Result<GenerationJob, AppError> {
        match self.get_job(job_id)? {
            None => Err(AppError::NotFound(format!("Unknown job id '{}'", job_id))),
            Some(job) if changed == 0 => Err(AppError::Conflict(format!(
                "Job '{}' is already {}",
                job_id,
                job.status.as_str()
            ))),
            Some(job) => Ok(job),
        }
    }
}

const SELECT_VOICE: &str = "SELECT id, user_id, name, audio_path, status, provider_job_id, \
                            error_reason, created_at, updated_at FROM voice_profiles";

const SELECT_JOB: &str = "SELECT id, user_id, voice_id, text, exaggeration, pace, temperature, \
                          status, provider_job_id, output_path, error_reason, created_at, \
                          updated_at FROM generation_jobs";

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let invite_status: String = row.get(2)?;
    let role: String = row.get(3)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        invite_status: InviteStatus::parse(&invite_status).unwrap_or(InviteStatus::Revoked),
        role: Role::parse(&role).unwrap_or(Role::User),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn row_to_voice(row: &Row<'_>) -> rusqlite::Result<VoiceProfile> {
    let status: String = row.get(4)?;
    Ok(VoiceProfile {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        audio_path: row.get(3)?,
        status: VoiceStatus::parse(&status).unwrap_or(VoiceStatus::Failed),
        provider_job_id: row.get(5)?,
        error_reason: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<GenerationJob> {
    let status: String = row.get(7)?;
    Ok(GenerationJob {
        id: row.get(0)?,
        user_id: row.get(1)?,
        voice_id: row.get(2)?,
        text: row.get(3)?,
        params: GenerationParams {
            exaggeration: row.get(4)?,
            pace: row.get(5)?,
            temperature: row.get(6)?,
        },
        status: JobStatus::parse(&status).unwrap_or(JobStatus::Failed),
        provider_job_id: row.get(8)?,
        output_path: row.get(9)?,
        error_reason: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::open_in_memory().unwrap()
    }

    fn ready_voice(reg: &Registry, user_id: &str) -> VoiceProfile {
        let voice = reg.create_voice(user_id, "Test Voice", "uploads/ref.wav").unwrap();
        reg.mark_training(&voice.id, "prov-1").unwrap();
        reg.mark_ready(&voice.id).unwrap()
    }

    #[test]
    fn test_signup_and_approval() {
        let reg = registry();
        let user = reg.create_user("alice").unwrap();
        assert_eq!(user.invite_status, InviteStatus::Pending);
        assert!(!user.is_approved());

        let approved = reg.approve_user(&user.id).unwrap();
        assert_eq!(approved.invite_status, InviteStatus::Approved);
    }

    #[test]
    fn test_duplicate_username_conflicts() {
        let reg = registry();
        reg.create_user("alice").unwrap();
        let err = reg.create_user("alice").unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_approve_twice_conflicts() {
        let reg = registry();
        let user = reg.create_user("alice").unwrap();
        reg.approve_user(&user.id).unwrap();
        assert!(matches!(
            reg.approve_user(&user.id).unwrap_err(),
            AppError::Conflict(_)
        ));
    }

    #[test]
    fn test_revoke_is_soft() {
        let reg = registry();
        let user = reg.create_user("alice").unwrap();
        reg.approve_user(&user.id).unwrap();
        let revoked = reg.revoke_user(&user.id).unwrap();
        assert_eq!(revoked.invite_status, InviteStatus::Revoked);
        // Row survives revocation.
        assert!(reg.get_user(&user.id).unwrap().is_some());
        assert!(matches!(
            reg.revoke_user(&user.id).unwrap_err(),
            AppError::Conflict(_)
        ));
    }

    #[test]
    fn test_voice_lifecycle() {
        let reg = registry();
        let user = reg.create_user("alice").unwrap();
        let voice = reg.create_voice(&user.id, "My Voice", "uploads/a.wav").unwrap();
        assert_eq!(voice.status, VoiceStatus::Uploaded);

        let voice = reg.mark_training(&voice.id, "prov-42").unwrap();
        assert_eq!(voice.status, VoiceStatus::Training);
        assert_eq!(voice.provider_job_id.as_deref(), Some("prov-42"));

        let voice = reg.mark_ready(&voice.id).unwrap();
        assert_eq!(voice.status, VoiceStatus::Ready);
    }

    #[test]
    fn test_voice_terminal_states_never_transition() {
        let reg = registry();
        let user = reg.create_user("alice").unwrap();
        let voice = ready_voice(&reg, &user.id);

        assert!(matches!(
            reg.mark_ready(&voice.id).unwrap_err(),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            reg.mark_voice_failed(&voice.id, "late failure").unwrap_err(),
            AppError::Conflict(_)
        ));
        // Status untouched by the rejected transitions.
        assert_eq!(
            reg.get_voice(&voice.id).unwrap().unwrap().status,
            VoiceStatus::Ready
        );
    }

    #[test]
    fn test_voice_lookup_by_provider_job() {
        let reg = registry();
        let user = reg.create_user("alice").unwrap();
        let voice = reg.create_voice(&user.id, "V", "uploads/a.wav").unwrap();
        reg.mark_training(&voice.id, "prov-7").unwrap();
        let found = reg.find_voice_by_provider_job("prov-7").unwrap().unwrap();
        assert_eq!(found.id, voice.id);
        assert!(reg.find_voice_by_provider_job("nope").unwrap().is_none());
    }

    #[test]
    fn test_job_requires_ready_voice() {
        let reg = registry();
        let user = reg.create_user("alice").unwrap();
        let voice = reg.create_voice(&user.id, "V", "uploads/a.wav").unwrap();

        let err = reg
            .create_job(&user.id, &voice.id, "hello", GenerationParams::default())
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = reg
            .create_job(&user.id, "missing", "hello", GenerationParams::default())
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_job_transitions_exactly_once() {
        let reg = registry();
        let user = reg.create_user("alice").unwrap();
        let voice = ready_voice(&reg, &user.id);

        let job = reg
            .create_job(&user.id, &voice.id, "Hello world", GenerationParams::default())
            .unwrap();
        assert_eq!(job.status, JobStatus::Queued);

        let job = reg.mark_processing(&job.id, "prov-gen-1").unwrap();
        assert_eq!(job.status, JobStatus::Processing);

        let job = reg.complete_job(&job.id, "uploads/out.wav").unwrap();
        assert_eq!(job.status, JobStatus::Complete);
        assert_eq!(job.output_path.as_deref(), Some("uploads/out.wav"));

        // Replays are conflicts and mutate nothing.
        assert!(matches!(
            reg.complete_job(&job.id, "uploads/other.wav").unwrap_err(),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            reg.fail_job(&job.id, "late").unwrap_err(),
            AppError::Conflict(_)
        ));
        let stored = reg.get_job(&job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Complete);
        assert_eq!(stored.output_path.as_deref(), Some("uploads/out.wav"));
    }

    #[test]
    fn test_job_can_complete_straight_from_queued() {
        let reg = registry();
        let user = reg.create_user("alice").unwrap();
        let voice = ready_voice(&reg, &user.id);
        let job = reg
            .create_job(&user.id, &voice.id, "hi", GenerationParams::default())
            .unwrap();
        let job = reg.complete_job(&job.id, "uploads/out.wav").unwrap();
        assert_eq!(job.status, JobStatus::Complete);
    }

    #[test]
    fn test_failed_job_stores_reason() {
        let reg = registry();
        let user = reg.create_user("alice").unwrap();
        let voice = ready_voice(&reg, &user.id);
        let job = reg
            .create_job(&user.id, &voice.id, "hi", GenerationParams::default())
            .unwrap();
        let job = reg.fail_job(&job.id, "upstream timeout").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_reason.as_deref(), Some("upstream timeout"));
    }

    #[test]
    fn test_delete_voice() {
        let reg = registry();
        let user = reg.create_user("alice").unwrap();
        let voice = reg.create_voice(&user.id, "V", "uploads/a.wav").unwrap();
        reg.delete_voice(&voice.id).unwrap();
        assert!(reg.get_voice(&voice.id).unwrap().is_none());
        assert!(matches!(
            reg.delete_voice(&voice.id).unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[test]
    fn test_ensure_admin_idempotent() {
        let reg = registry();
        let a = reg.ensure_admin("admin").unwrap();
        assert!(a.is_admin());
        let b = reg.ensure_admin("admin").unwrap();
        assert_eq!(a.id, b.id);
    }
}
