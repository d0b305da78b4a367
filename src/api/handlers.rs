use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::{
    GenerateRequest, HealthResponse, JobResponse, SignupRequest, UsersResponse, VoicesResponse,
    WebhookPayload,
};
use crate::api::routes::AppState;
use crate::audio;
use crate::chatterbox::TtsOutcome;
use crate::error::AppError;
use crate::registry::User;

/// Header carrying the caller's identity.
const USER_HEADER: &str = "x-user-id";

fn caller(state: &AppState, headers: &HeaderMap) -> Result<User, AppError> {
    let id = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing X-User-Id header".into()))?;
    state
        .registry
        .get_user(id)?
        .ok_or_else(|| AppError::Unauthorized(format!("Unknown user '{}'", id)))
}

fn approved_caller(state: &AppState, headers: &HeaderMap) -> Result<User, AppError> {
    let user = caller(state, headers)?;
    if !user.is_approved() {
        return Err(AppError::Forbidden(format!(
            "Account '{}' is not approved",
            user.username
        )));
    }
    Ok(user)
}

fn admin_caller(state: &AppState, headers: &HeaderMap) -> Result<User, AppError> {
    let user = caller(state, headers)?;
    if !user.is_admin() {
        return Err(AppError::Forbidden("Admin access required".into()));
    }
    Ok(user)
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let username = request.username.trim();
    if username.is_empty() {
        return Err(AppError::BadRequest("Username cannot be empty".into()));
    }

    let user = state.registry.create_user(username)?;
    tracing::info!("Signup request from '{}' ({})", user.username, user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<UsersResponse>, AppError> {
    admin_caller(&state, &headers)?;
    let users = state.registry.list_users()?;
    Ok(Json(UsersResponse { users }))
}

pub async fn approve_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<User>, AppError> {
    let admin = admin_caller(&state, &headers)?;
    let user = state.registry.approve_user(&id)?;
    tracing::info!("User '{}' approved by '{}'", user.username, admin.username);
    Ok(Json(user))
}

pub async fn revoke_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<User>, AppError> {
    let admin = admin_caller(&state, &headers)?;
    let user = state.registry.revoke_user(&id)?;
    tracing::info!("User '{}' revoked by '{}'", user.username, admin.username);
    Ok(Json(user))
}

pub async fn upload_voice(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<crate::registry::VoiceProfile>), AppError> {
    let user = approved_caller(&state, &headers)?;

    let mut name: Option<String> = None;
    let mut data: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        match field.name() {
            Some("name") => {
                name = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(format!("Invalid name field: {}", e)))?,
                );
            }
            Some("audio") => {
                data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(format!("Invalid audio field: {}", e)))?
                        .to_vec(),
                );
            }
            _ => {}
        }
    }

    let name = name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::BadRequest("Voice name is required".into()))?;
    let data = data.ok_or_else(|| AppError::BadRequest("No audio file provided".into()))?;

    // Validation happens before any registry row exists.
    let kind = audio::validate_upload(&data, state.max_upload_bytes)?;
    let path = audio::save_audio(&state.uploads_dir, kind, &data)?;

    let voice = state
        .registry
        .create_voice(&user.id, &name, &path.to_string_lossy())?;

    let file_name = format!("{}.{}", voice.id, kind.extension());
    match state
        .chatterbox
        .start_training(&user.id, &name, &file_name, data)
        .await
    {
        Ok(provider_job_id) => {
            let voice = state.registry.mark_training(&voice.id, &provider_job_id)?;
            tracing::info!(
                "Voice '{}' ({}) uploaded, training as provider job {}",
                voice.name,
                voice.id,
                provider_job_id
            );
            Ok((StatusCode::CREATED, Json(voice)))
        }
        Err(e) => {
            let reason = e.to_string();
            if let Err(mark_err) = state.registry.mark_voice_failed(&voice.id, &reason) {
                tracing::error!("Failed to record training failure: {}", mark_err);
            }
            Err(e)
        }
    }
}

pub async fn list_voices(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<VoicesResponse>, AppError> {
    let user = approved_caller(&state, &headers)?;
    let voices = state.registry.list_voices_for_user(&user.id)?;
    Ok(Json(VoicesResponse { voices }))
}

pub async fn delete_voice(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = approved_caller(&state, &headers)?;
    let voice = state
        .registry
        .get_voice(&id)?
        .ok_or_else(|| AppError::NotFound(format!("Unknown voice id '{}'", id)))?;
    if voice.user_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only the owner or an admin can delete a voice".into(),
        ));
    }

    // Provider-side cleanup is best-effort; local state wins.
    if let Err(e) = state.chatterbox.delete_voice(&voice.id).await {
        tracing::warn!("Provider delete for voice {} failed: {}", voice.id, e);
    }

    audio::remove_audio(&voice.audio_path);
    state.registry.delete_voice(&voice.id)?;
    tracing::info!("Voice '{}' ({}) deleted", voice.name, voice.id);
    Ok(Json(serde_json::json!({ "status": "deleted" })))
}

pub async fn generate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<GenerateRequest>,
) -> Result<(StatusCode, Json<JobResponse>), AppError> {
    let user = approved_caller(&state, &headers)?;

    let text = request.text.trim();
    if text.is_empty() {
        return Err(AppError::BadRequest("Text cannot be empty".into()));
    }
    let params = request.params();
    params.validate().map_err(AppError::BadRequest)?;

    let voice = state
        .registry
        .get_voice(&request.voice_id)?
        .ok_or_else(|| AppError::NotFound(format!("Unknown voice id '{}'", request.voice_id)))?;
    if voice.user_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only the owner or an admin can use this voice".into(),
        ));
    }

    // create_job enforces that the voice is ready.
    let job = state
        .registry
        .create_job(&user.id, &voice.id, text, params)?;

    match state.chatterbox.generate(&voice.id, text, &params).await {
        Ok(TtsOutcome::Audio(bytes)) => {
            let path = audio::save_audio(&state.uploads_dir, audio::AudioKind::Wav, &bytes)?;
            let job = state
                .registry
                .complete_job(&job.id, &path.to_string_lossy())?;
            tracing::info!("Job {} completed synchronously", job.id);
            Ok((StatusCode::ACCEPTED, Json(job.into())))
        }
        Ok(TtsOutcome::Pending { provider_job_id }) => {
            let job = state.registry.mark_processing(&job.id, &provider_job_id)?;
            tracing::info!(
                "Job {} processing as provider job {}",
                job.id,
                provider_job_id
            );
            Ok((StatusCode::ACCEPTED, Json(job.into())))
        }
        Err(e) => {
            let reason = e.to_string();
            if let Err(fail_err) = state.registry.fail_job(&job.id, &reason) {
                tracing::error!("Failed to record job failure: {}", fail_err);
            }
            Err(e)
        }
    }
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, AppError> {
    let user = approved_caller(&state, &headers)?;
    let job = state
        .registry
        .get_job(&id)?
        .ok_or_else(|| AppError::NotFound(format!("Unknown job id '{}'", id)))?;
    if job.user_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only the owner or an admin can view this job".into(),
        ));
    }
    Ok(Json(job.into()))
}

pub async fn download_audio(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Response, AppError> {
    let job = state
        .registry
        .get_job(&job_id)?
        .ok_or_else(|| AppError::NotFound(format!("Unknown job id '{}'", job_id)))?;
    let output_path = job
        .output_path
        .as_deref()
        .ok_or_else(|| AppError::NotFound(format!("Job '{}' has no audio yet", job_id)))?;

    let bytes = std::fs::read(output_path)?;
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "audio/wav")], bytes).into_response())
}

pub async fn chatterbox_webhook(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WebhookPayload>,
) -> Result<Json<serde_json::Value>, AppError> {
    tracing::info!(
        "Received webhook: {} for provider job {}",
        payload.event_type,
        payload.job_id
    );

    match payload.event_type.as_str() {
        "training_completed" => {
            let voice = resolve_voice(&state, &payload)?;
            state.registry.mark_ready(&voice.id)?;
        }
        "training_failed" => {
            let voice = resolve_voice(&state, &payload)?;
            let reason = payload.message.as_deref().unwrap_or("training failed");
            state.registry.mark_voice_failed(&voice.id, reason)?;
        }
        "generation_completed" => {
            let job = resolve_job(&state, &payload)?;
            if job.status.is_terminal() {
                return Err(AppError::Conflict(format!(
                    "Job '{}' is already {}",
                    job.id,
                    job.status.as_str()
                )));
            }
            let audio_url = payload.audio_url.as_deref().ok_or_else(|| {
                AppError::BadRequest("generation_completed requires audio_url".into())
            })?;
            let bytes = state.chatterbox.fetch_audio(audio_url).await?;
            let path = audio::save_audio(&state.uploads_dir, audio::AudioKind::Wav, &bytes)?;
            state
                .registry
                .complete_job(&job.id, &path.to_string_lossy())?;
        }
        "generation_failed" => {
            let job = resolve_job(&state, &payload)?;
            let reason = payload.message.as_deref().unwrap_or("generation failed");
            state.registry.fail_job(&job.id, reason)?;
        }
        other => {
            return Err(AppError::BadRequest(format!(
                "Unknown event type '{}'",
                other
            )));
        }
    }

    Ok(Json(serde_json::json!({ "status": "ok" })))
}

fn resolve_voice(
    state: &AppState,
    payload: &WebhookPayload,
) -> Result<crate::registry::VoiceProfile, AppError> {
    if let Some(voice_id) = payload.voice_id.as_deref() {
        if let Some(voice) = state.registry.get_voice(voice_id)? {
            return Ok(voice);
        }
    }
    state
        .registry
        .find_voice_by_provider_job(&payload.job_id)?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "No voice matches provider job '{}'",
                payload.job_id
            ))
        })
}

fn resolve_job(
    state: &AppState,
    payload: &WebhookPayload,
) -> Result<crate::registry::GenerationJob, AppError> {
    state
        .registry
        .find_job_by_provider_job(&payload.job_id)?
        .ok_or_else(|| {
            AppError::NotFound(format!("No job matches provider job '{}'", payload.job_id))
        })
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
