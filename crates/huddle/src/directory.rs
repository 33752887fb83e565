//! Room directory: plain HTTP access to room metadata.
//!
//! - `GET /rooms` → `200`, an object mapping room name to metadata
//! - `POST /rooms/create` with `{"roomName": …}` → `201 {"roomName": …}`
//!
//! Failures come back as `{"code": …, "message": …}` using the same codes
//! as socket `error` events.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use huddle_protocol::{ErrorCode, RoomName, Username};
use huddle_room::{RoomError, RoomInfo};
use serde::{Deserialize, Serialize};

use crate::server::ServerState;

/// Body of `POST /rooms/create`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateRoomRequest {
    room_name: RoomName,
    #[serde(default)]
    username: Option<Username>,
}

/// Body of a successful `POST /rooms/create`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateRoomResponse {
    room_name: RoomName,
}

/// An error answer from the directory.
#[derive(Debug, Serialize)]
pub(crate) struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    code: ErrorCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: ErrorCode::InvalidRequest,
            message: message.into(),
        }
    }
}

impl From<RoomError> for ApiError {
    fn from(e: RoomError) -> Self {
        let code = e.code();
        let status = match code {
            ErrorCode::RoomAlreadyExists => StatusCode::CONFLICT,
            ErrorCode::RoomNotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            code,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// `GET /rooms`
pub(crate) async fn list_rooms(
    State(state): State<Arc<ServerState>>,
) -> Json<BTreeMap<RoomName, RoomInfo>> {
    Json(state.rooms.list_rooms().await)
}

/// `POST /rooms/create`
pub(crate) async fn create_room(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateRoomResponse>), ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let created_by = request
        .username
        .filter(|u| !u.as_str().trim().is_empty());

    let handle = state
        .rooms
        .create_room(request.room_name, created_by)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateRoomResponse {
            room_name: handle.name().clone(),
        }),
    ))
}
