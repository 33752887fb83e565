//! `HuddleServer` builder and server loop.
//!
//! This is the entry point for running a Huddle chat server. It ties
//! together all the layers: transport → protocol → session → room, and
//! serves the socket endpoint and the room directory from one listener.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::Response;
use axum::routing::{get, post};
use huddle_protocol::JsonCodec;
use huddle_room::{RoomConfig, RoomStore};
use huddle_session::{Session, SessionConfig, SessionRegistry};
use huddle_transport::{TransportError, WebSocketConnection};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handler::handle_connection;
use crate::{HuddleError, ServerConfig, directory};

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The session
/// registry sits behind one mutex; the room store does its own locking.
/// Removing a member whose session just ended happens under the session
/// lock, so a rejoin under the same name sees both or neither.
pub(crate) struct ServerState {
    pub(crate) sessions: Mutex<SessionRegistry>,
    pub(crate) rooms: RoomStore,
    pub(crate) codec: JsonCodec,
    pub(crate) config: ServerConfig,
}

/// Builder for configuring and starting a Huddle server.
///
/// # Example
///
/// ```rust,no_run
/// use huddle::prelude::*;
///
/// # async fn start() -> Result<(), HuddleError> {
/// let server = HuddleServer::builder()
///     .bind("0.0.0.0:8080")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct HuddleServerBuilder {
    config: ServerConfig,
}

impl HuddleServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Replaces every setting with `config`.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config.session = config;
        self
    }

    /// Sets the configuration every room is created with.
    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.config.room = config;
        self
    }

    /// Sets the idle read timeout in seconds (0 disables it).
    pub fn idle_timeout_secs(mut self, secs: u64) -> Self {
        self.config.idle_timeout_secs = secs;
        self
    }

    /// Sets how many events may queue per connection.
    pub fn outbox_capacity(mut self, capacity: usize) -> Self {
        self.config.outbox_capacity = capacity;
        self
    }

    /// Sets the session sweep period in seconds.
    pub fn sweep_interval_secs(mut self, secs: u64) -> Self {
        self.config.sweep_interval_secs = secs;
        self
    }

    /// Binds the listener. The server doesn't accept anything until
    /// [`HuddleServer::run`].
    pub async fn build(self) -> Result<HuddleServer, HuddleError> {
        let listener = TcpListener::bind(&self.config.bind)
            .await
            .map_err(TransportError::BindFailed)?;

        let state = Arc::new(ServerState {
            sessions: Mutex::new(SessionRegistry::new(self.config.session.clone())),
            rooms: RoomStore::new(self.config.room.clone()),
            codec: JsonCodec,
            config: self.config,
        });

        Ok(HuddleServer { listener, state })
    }
}

impl Default for HuddleServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Huddle server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct HuddleServer {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl HuddleServer {
    /// Creates a new builder.
    pub fn builder() -> HuddleServerBuilder {
        HuddleServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The HTTP application: `/ws`, `GET /rooms` and `POST /rooms/create`.
    ///
    /// Shares state with this server, so rooms created through one router are
    /// visible to every other.
    pub fn router(&self) -> Router {
        router(Arc::clone(&self.state))
    }

    /// Serves until the process is terminated.
    pub async fn run(self) -> Result<(), HuddleError> {
        self.run_until(std::future::pending()).await
    }

    /// Serves until `shutdown` resolves, then stops accepting connections.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), HuddleError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        tracing::info!(%addr, "huddle server listening");

        let sweeper = tokio::spawn(sweep_sessions(Arc::clone(&self.state)));
        let app = router(self.state);

        let result = axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown)
            .await;
        sweeper.abort();

        if let Err(e) = &result {
            tracing::error!(error = %e, "server stopped with error");
        }
        result.map_err(HuddleError::from)
    }
}

fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/ws", get(upgrade))
        .route("/rooms", get(directory::list_rooms))
        .route("/rooms/create", post(directory::create_room))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Upgrades `GET /ws` and hands the socket to its own handler task.
async fn upgrade(ws: WebSocketUpgrade, State(state): State<Arc<ServerState>>) -> Response {
    ws.on_upgrade(move |socket| async move {
        let conn = WebSocketConnection::new(socket);
        if let Err(e) = handle_connection(conn, state).await {
            tracing::debug!(error = %e, "connection ended with error");
        }
    })
}

/// Removes members whose reconnect grace period ran out.
async fn sweep_sessions(state: Arc<ServerState>) {
    let mut ticker = tokio::time::interval(state.config.sweep_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let mut sessions = state.sessions.lock().await;
        for session in sessions.expire_stale() {
            remove_expired(&state.rooms, &session).await;
        }
    }
}

/// Takes an expired session's member out of its room. Callers hold the
/// session lock.
pub(crate) async fn remove_expired(rooms: &RoomStore, session: &Session) {
    match rooms
        .remove_member(&session.room, session.username.clone())
        .await
    {
        Ok(true) => tracing::info!(
            room = %session.room,
            username = %session.username,
            "removed member after reconnect grace expired"
        ),
        Ok(false) => {}
        Err(e) => tracing::warn!(
            room = %session.room,
            username = %session.username,
            error = %e,
            "could not remove expired member"
        ),
    }
}
