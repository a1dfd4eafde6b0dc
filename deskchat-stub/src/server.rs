//! Stub server core: shared state, REST handlers and startup.
//!
//! Serves the three support-chat endpoints the client uses, plus one
//! endpoint to inject desk replies:
//!
//! ```text
//! GET  /support/chat/messages        -> {"data": [record, ...]}
//! POST /support/chat/messages        -> {"data": record}     (app user)
//! POST /support/chat/messages/read   -> {"data": {"marked": n}}
//! POST /support/chat/replies         -> {"data": record}     (desk staff)
//! ```
//!
//! When a token is configured every call must carry
//! `Authorization: Bearer <token>`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use deskchat_proto::codec::DataEnvelope;
use deskchat_proto::message::{
    DEFAULT_COUNTERPART_ROLE, DEFAULT_SELF_ROLE, MAX_MESSAGE_LEN, RawMessage, SendRequest,
    ValidationError,
};

use crate::store::ConversationStore;

/// Errors returned by the stub's handlers.
#[derive(Debug, thiserror::Error)]
pub enum StubError {
    /// Missing or wrong bearer token.
    #[error("unauthorized")]
    Unauthorized,

    /// The message body failed validation.
    #[error("invalid message: {0}")]
    Invalid(#[from] ValidationError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for StubError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Body of the mark-read response.
#[derive(Debug, Serialize)]
struct ReadReceipt {
    marked: usize,
}

/// Shared stub state holding the conversation and access settings.
#[derive(Debug)]
pub struct StubState {
    /// The single support conversation.
    pub store: ConversationStore,
    /// Bearer token required on every call, if any.
    token: Option<String>,
    /// Role stamped on records sent by the app user.
    self_role: String,
    /// Role stamped on injected desk replies.
    counterpart_role: String,
}

impl Default for StubState {
    fn default() -> Self {
        Self::new()
    }
}

impl StubState {
    /// Creates an open (no token) state with default roles and limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(
            None,
            ConversationStore::new(),
            DEFAULT_SELF_ROLE,
            DEFAULT_COUNTERPART_ROLE,
        )
    }

    /// Creates a state with a custom token, store and role names.
    #[must_use]
    pub fn with_config(
        token: Option<String>,
        store: ConversationStore,
        self_role: impl Into<String>,
        counterpart_role: impl Into<String>,
    ) -> Self {
        Self {
            store,
            token: token.filter(|t| !t.is_empty()),
            self_role: self_role.into(),
            counterpart_role: counterpart_role.into(),
        }
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), StubError> {
        let Some(expected) = &self.token else {
            return Ok(());
        };
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented == Some(expected.as_str()) {
            Ok(())
        } else {
            Err(StubError::Unauthorized)
        }
    }
}

/// Builds the router for `state`.
#[must_use]
pub fn router(state: Arc<StubState>) -> Router {
    Router::new()
        .route("/support/chat/messages", get(history).post(send))
        .route("/support/chat/messages/read", post(mark_read))
        .route("/support/chat/replies", post(reply))
        .with_state(state)
}

/// Starts the stub server on the given address with default state and
/// returns the bound address and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(StubState::new())).await
}

/// Starts the stub server with a pre-configured [`StubState`].
///
/// This is the primary entry point used by both `main.rs` and test code.
/// Bind to `127.0.0.1:0` for an OS-assigned port.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<StubState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "stub server error");
        }
    });

    Ok((bound_addr, handle))
}

/// `GET /support/chat/messages`
async fn history(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
) -> Result<Json<DataEnvelope<Vec<RawMessage>>>, StubError> {
    state.authorize(&headers)?;
    let records = state.store.history().await;
    tracing::debug!(count = records.len(), "served history");
    Ok(Json(DataEnvelope { data: records }))
}

/// `POST /support/chat/messages`
async fn send(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Json(request): Json<SendRequest>,
) -> Result<(StatusCode, Json<DataEnvelope<RawMessage>>), StubError> {
    state.authorize(&headers)?;
    let record = append(&state, &request, &state.self_role).await?;
    tracing::info!(id = ?record.id, "message received");
    Ok((StatusCode::CREATED, Json(DataEnvelope { data: record })))
}

/// `POST /support/chat/messages/read`
async fn mark_read(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
) -> Result<Json<DataEnvelope<ReadReceipt>>, StubError> {
    state.authorize(&headers)?;
    let marked = state.store.mark_all_read().await;
    tracing::debug!(marked, "marked conversation read");
    Ok(Json(DataEnvelope {
        data: ReadReceipt { marked },
    }))
}

/// `POST /support/chat/replies`
async fn reply(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Json(request): Json<SendRequest>,
) -> Result<(StatusCode, Json<DataEnvelope<RawMessage>>), StubError> {
    state.authorize(&headers)?;
    let record = append(&state, &request, &state.counterpart_role).await?;
    tracing::info!(id = ?record.id, "desk reply injected");
    Ok((StatusCode::CREATED, Json(DataEnvelope { data: record })))
}

async fn append(
    state: &StubState,
    request: &SendRequest,
    role: &str,
) -> Result<RawMessage, StubError> {
    request.validate_with_limit(MAX_MESSAGE_LEN)?;
    Ok(state.store.append(request.message.trim(), role).await)
}
