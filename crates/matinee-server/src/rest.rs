//! REST endpoints for session lifecycle and vote submission.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use matinee_core::{MediaId, SessionId, UserId, VotingError, errors};
use matinee_protocol::{RoundInfo, RoundResults};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::server::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Request/response bodies
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub host_id: UserId,
    pub username: String,
    #[serde(default)]
    pub max_participants: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
    pub host_id: UserId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteRequest {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub media_id: MediaId,
    pub value: i8,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub round_id: matinee_core::RoundId,
    pub votes_submitted: usize,
    pub total_expected: usize,
    pub round_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<RoundResults>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRoundRequest {
    pub user_id: UserId,
    pub media_options: Vec<MediaId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndRoundRequest {
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSessionRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub max_participants: Option<usize>,
    /// Set to `"CLOSED"` to end the session.
    #[serde(default)]
    pub status: Option<String>,
}

/// Error body shared by every 4xx response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Error mapping
// ─────────────────────────────────────────────────────────────────────────────

/// Wraps [`VotingError`] so it can flow out of handlers with `?`.
#[derive(Debug)]
pub struct ApiError(pub VotingError);

impl From<VotingError> for ApiError {
    fn from(e: VotingError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            VotingError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
            VotingError::SessionClosed { .. }
            | VotingError::DuplicateVote { .. }
            | VotingError::SessionFull { .. } => StatusCode::CONFLICT,
            VotingError::NotAuthorized { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::BAD_REQUEST,
        };
        let body = ErrorBody {
            code: self.0.code().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// `POST /sessions`
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> (StatusCode, Json<CreateSessionResponse>) {
    let session_id =
        state
            .engine
            .create_session(req.host_id.clone(), req.username, req.max_participants);
    debug!(session_id = %session_id, "session created via rest");
    (
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id,
            host_id: req.host_id,
        }),
    )
}

/// `POST /votes`
pub async fn cast_vote(
    State(state): State<AppState>,
    Json(req): Json<CastVoteRequest>,
) -> Result<(StatusCode, Json<VoteResponse>), ApiError> {
    let outcome = state
        .engine
        .cast_vote(
            &req.session_id,
            req.user_id,
            req.media_id,
            req.value,
            req.weight,
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(VoteResponse {
            round_id: outcome.round_id,
            votes_submitted: outcome.votes_submitted,
            total_expected: outcome.total_expected,
            round_completed: outcome.round_completed,
            results: outcome.results,
        }),
    ))
}

/// `GET /sessions/{id}/results`
///
/// 200 with the latest completed round's results, 404 for unknown
/// sessions, 409 while no round has completed yet.
pub async fn get_results(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<RoundResults>, Response> {
    match state.engine.results(&session_id).await {
        Ok(Some(results)) => Ok(Json(results)),
        Ok(None) => {
            let body = ErrorBody {
                code: errors::SESSION_CLOSED.to_string(),
                message: format!("session '{session_id}' has no completed round"),
            };
            Err((StatusCode::CONFLICT, Json(body)).into_response())
        }
        Err(e) => Err(ApiError(e).into_response()),
    }
}

/// `POST /sessions/{id}/rounds`
pub async fn start_round(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Json(req): Json<StartRoundRequest>,
) -> Result<(StatusCode, Json<RoundInfo>), ApiError> {
    let info = state
        .engine
        .start_round(&session_id, &req.user_id, req.media_options)
        .await?;
    Ok((StatusCode::CREATED, Json(info)))
}

/// `POST /sessions/{id}/rounds/current/complete`
pub async fn end_round(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Json(req): Json<EndRoundRequest>,
) -> Result<Json<RoundResults>, ApiError> {
    let results = state.engine.end_round(&session_id, &req.user_id).await?;
    Ok(Json(results))
}

/// `PATCH /sessions/{id}`
pub async fn update_session(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Json(req): Json<UpdateSessionRequest>,
) -> Result<StatusCode, ApiError> {
    if let Some(cap) = req.max_participants {
        state
            .engine
            .update_settings(&session_id, &req.user_id, cap)
            .await?;
    }
    if req.status.as_deref() == Some("CLOSED") {
        state.engine.end_session(&session_id, &req.user_id).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err = ApiError(VotingError::SessionNotFound {
            session_id: SessionId::from("x"),
        });
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn duplicate_vote_maps_to_409() {
        let err = ApiError(VotingError::DuplicateVote {
            user_id: UserId::from("u1"),
            media_id: MediaId::from("m1"),
        });
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn not_authorized_maps_to_403() {
        let err = ApiError(VotingError::NotAuthorized {
            user_id: UserId::from("u1"),
            action: "start a round".into(),
        });
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn invalid_value_maps_to_400() {
        let err = ApiError(VotingError::InvalidVoteValue {
            value: 7,
            min: -1,
            max: 1,
        });
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn vote_request_defaults_weight() {
        let req: CastVoteRequest = serde_json::from_str(
            r#"{"sessionId":"s1","userId":"u1","mediaId":"m1","value":1}"#,
        )
        .unwrap();
        assert_eq!(req.weight, 1);
    }

    #[test]
    fn vote_response_omits_absent_results() {
        let resp = VoteResponse {
            round_id: matinee_core::RoundId::from("r1"),
            votes_submitted: 1,
            total_expected: 3,
            round_completed: false,
            results: None,
        };
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["roundId"], "r1");
        assert_eq!(value["roundCompleted"], false);
        assert!(value.get("results").is_none());
    }
}
