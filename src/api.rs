//! HTTP API endpoints for creating and joining rooms.
//!
//! Gameplay itself runs over the WebSocket; these endpoints hand out the
//! room code and the per-player join token the socket needs.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::GameError;
use crate::phase::PhaseSnapshot;
use crate::state::{AppState, CreateRoom};
use crate::types::{Player, PlayerInfo, Question, Room, RoomCode, RoomMode, RoundResult};

/// A `GameError` rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub GameError);

impl From<GameError> for ApiError {
    fn from(e: GameError) -> Self {
        Self(e)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    msg: String,
}

fn status_for(e: &GameError) -> StatusCode {
    match e {
        GameError::RoomNotFound(_) | GameError::PlayerNotFound => StatusCode::NOT_FOUND,
        GameError::NotARoomMember(_)
        | GameError::NotChallengeGiver
        | GameError::NotWinner => StatusCode::FORBIDDEN,
        GameError::AlreadyVoted
        | GameError::InvalidTransition { .. }
        | GameError::DareAlreadySubmitted => StatusCode::CONFLICT,
        GameError::NoWinner
        | GameError::NoChallengeGiver
        | GameError::DareMissing
        | GameError::InvalidDare(_)
        | GameError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        GameError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!("API request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorBody {
                code: self.0.code(),
                msg: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedRoom {
    pub room: Room,
    /// The host's own player record, join token included
    pub host: Player,
}

/// Public view of a room. Never carries join tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct RoomSummary {
    pub code: RoomCode,
    pub mode: RoomMode,
    pub host_id: String,
    pub questions: Vec<Question>,
    pub players: Vec<PlayerInfo>,
    pub snapshot: PhaseSnapshot,
}

#[derive(Debug, Default, Deserialize)]
pub struct JoinRoom {
    pub display_name: Option<String>,
}

/// Create a room and its host.
///
/// POST /api/rooms
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRoom>,
) -> Result<(StatusCode, Json<CreatedRoom>), ApiError> {
    let (room, host) = state.create_room(req).await?;
    Ok((StatusCode::CREATED, Json(CreatedRoom { room, host })))
}

/// GET /api/rooms/{code}
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<RoomSummary>, ApiError> {
    let session = state
        .get_session(&code)
        .await
        .ok_or_else(|| GameError::RoomNotFound(code.to_uppercase()))?;
    let players = state.roster(&session.room.code).await?;
    let snapshot = session.machine.lock().await.snapshot();

    Ok(Json(RoomSummary {
        code: session.room.code.clone(),
        mode: session.room.mode,
        host_id: session.room.host_id.clone(),
        questions: session.room.questions.clone(),
        players,
        snapshot,
    }))
}

/// Join a room as a new player.
///
/// POST /api/rooms/{code}/players
pub async fn join_room(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    body: Option<Json<JoinRoom>>,
) -> Result<(StatusCode, Json<Player>), ApiError> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let player = state.join_room(&code, req.display_name).await?;
    Ok((StatusCode::CREATED, Json(player)))
}

/// Results of finished rounds. Empty until the room has finished.
/// Dares stay private: they only reach the winner over the WebSocket.
///
/// GET /api/rooms/{code}/results
pub async fn room_results(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<Vec<RoundResult>>, ApiError> {
    Ok(Json(state.room_results(&code, None).await?))
}

pub async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abuse::AbuseConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use tower::ServiceExt;

    fn test_app() -> (Arc<AppState>, axum::Router) {
        let state = Arc::new(AppState::default());
        let app = crate::app(state.clone(), Arc::new(AbuseConfig::default()));
        (state, app)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_get_room() {
        let (_state, app) = test_app();

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/rooms",
                r#"{"host_name":"Ann","question_count":3}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created: CreatedRoom = json_body(response).await;
        assert_eq!(created.host.display_name, "Ann");
        assert_eq!(created.room.questions.len(), 3);
        assert!(!created.host.token.is_empty());

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/rooms/{}", created.room.code.to_lowercase()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let raw: serde_json::Value = json_body(response).await;
        assert!(!raw.to_string().contains(&created.host.token));
        let summary: RoomSummary = serde_json::from_value(raw).unwrap();
        assert_eq!(summary.players.len(), 1);
        assert_eq!(summary.snapshot.total_questions, 3);
    }

    #[tokio::test]
    async fn test_join_room_without_body_gets_generated_name() {
        let (state, app) = test_app();
        let (room, _host) = state.create_room(CreateRoom::default()).await.unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/rooms/{}/players", room.code))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let player: Player = json_body(response).await;
        assert!(!player.display_name.is_empty());
        assert_eq!(player.room_code, room.code);
    }

    #[tokio::test]
    async fn test_unknown_room_is_404() {
        let (_state, app) = test_app();

        let response = app
            .clone()
            .oneshot(post_json("/api/rooms/ZZZZZ/players", r#"{"display_name":"Bo"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = json_body(response).await;
        assert_eq!(body["code"], "ROOM_NOT_FOUND");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/rooms/ZZZZZ/results")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_questions_is_400() {
        let (_state, app) = test_app();
        let response = app
            .oneshot(post_json("/api/rooms", r#"{"questions":[""]}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_results_never_expose_dares() {
        let (state, app) = test_app();
        let (room, host) = state
            .create_room(CreateRoom {
                questions: Some(vec!["Who is most likely to cry at a movie?".into()]),
                ..CreateRoom::default()
            })
            .await
            .unwrap();
        let bob = state.join_room(&room.code, Some("Bob".into())).await.unwrap();

        {
            let session = state.get_session(&room.code).await.unwrap();
            let mut machine = session.machine.lock().await;
            machine.cast_vote(&host.id, &bob.id).await.unwrap();
            machine.close_voting().unwrap();
            machine.start_challenge(&mut rand::rng()).unwrap();
            machine.reveal_challenge().unwrap();
            machine.submit_dare(&host.id, "Hum the anthem").unwrap();
            machine.complete_dare(&bob.id).await.unwrap();
        }

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/rooms/{}/results", room.code))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let raw: serde_json::Value = json_body(response).await;
        assert!(!raw.to_string().contains("Hum the anthem"));
        let results: Vec<RoundResult> = serde_json::from_value(raw).unwrap();
        assert_eq!(results[0].winner_id.as_deref(), Some(bob.id.as_str()));
    }

    #[tokio::test]
    async fn test_health() {
        let (_state, app) = test_app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ok");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&GameError::AlreadyVoted), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&GameError::Backend("down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status_for(&GameError::NotWinner), StatusCode::FORBIDDEN);
    }
}
