//! HTTP surface: the three routes the core contracts with viewers.
//!
//! - `GET /stream` — chunked octet-stream of wire frames for one session,
//!   admission-controlled by the throttle gate.
//! - `GET /events` — server-sent stream of JSON pen events.
//! - `GET /gestures` — WebSocket emitting `"Swipe Left"` / `"Swipe Right"`.
//!
//! Everything stateful lives in the core; handlers only wire channels,
//! bodies and sockets together and map errors to status codes.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use inkstream_core::input::EV_ABS;
use inkstream_core::{
    BufferPool, EventBus, EventFilter, EventSource, FrameSource, SessionConfig, StreamError,
    StreamSession, SubscriberToken, SwipeDetector, ThrottleGate,
};

use crate::config::ServerConfig;

/// In-flight bytes buffered between a session and its HTTP body.
const STREAM_BUFFER: usize = 64 * 1024;

// ── AppState ─────────────────────────────────────────────────────

/// Shared handles behind every route.
pub struct AppState {
    source: Arc<dyn FrameSource>,
    bus: Arc<EventBus>,
    pool: Arc<BufferPool>,
    gate: Arc<ThrottleGate>,
    session: SessionConfig,
}

impl AppState {
    pub fn new(source: Arc<dyn FrameSource>, bus: Arc<EventBus>, config: &ServerConfig) -> Arc<Self> {
        let pool = BufferPool::new(source.frame_size());
        let gate = ThrottleGate::new(config.http.max_streams);
        Arc::new(Self {
            source,
            bus,
            pool,
            gate,
            session: config.session_config(),
        })
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn gate(&self) -> &Arc<ThrottleGate> {
        &self.gate
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/stream", get(stream))
        .route("/events", get(events))
        .route("/gestures", get(gestures))
        .with_state(state)
}

// ── /stream ──────────────────────────────────────────────────────

async fn stream(State(state): State<Arc<AppState>>) -> Response {
    // Admission first; the wait (if any) happens off the async runtime.
    let gate = Arc::clone(&state.gate);
    let permit = match tokio::task::spawn_blocking(move || gate.acquire()).await {
        Ok(Ok(permit)) => permit,
        Ok(Err(StreamError::Busy)) => return StatusCode::TOO_MANY_REQUESTS.into_response(),
        Ok(Err(e)) => {
            error!("throttle acquire failed: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        Err(e) => {
            error!("throttle task failed: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let session = match StreamSession::new(
        Arc::clone(&state.source),
        Arc::clone(&state.bus),
        Arc::clone(&state.pool),
        state.session,
    ) {
        Ok(session) => session,
        Err(e) => {
            error!("session setup failed: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // The session writes into one end of an in-process pipe; the other end
    // becomes the response body. Dropping the body (client gone) cancels
    // the session via the guard, and the permit is released when the
    // session task finishes.
    let (mut writer, reader) = tokio::io::duplex(STREAM_BUFFER);
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    tokio::spawn(async move {
        let _permit = permit;
        match session.run(&mut writer, cancel).await {
            Ok(()) => debug!("stream session closed"),
            Err(e) => debug!("stream session ended: {e}"),
        }
    });

    let body = ReaderStream::new(reader).map(move |chunk| {
        let _ = &guard;
        chunk
    });

    match Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "close")
        .body(Body::from_stream(body))
    {
        Ok(response) => response,
        Err(e) => {
            error!("response build failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ── /events ──────────────────────────────────────────────────────

/// Releases a bus registration when the consuming stream is dropped.
struct Unsubscribe {
    bus: Arc<EventBus>,
    token: SubscriberToken,
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.token);
    }
}

async fn events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl futures::Stream<Item = Result<Event, axum::Error>>> {
    let subscription = state
        .bus
        .subscribe(Some(EventFilter::source(EventSource::Pen)));
    let (token, rx) = subscription.into_parts();
    let guard = Unsubscribe {
        bus: Arc::clone(&state.bus),
        token,
    };

    let stream = ReceiverStream::new(rx).map(move |event| {
        let _ = &guard;
        Event::default().json_data(&event)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ── /gestures ────────────────────────────────────────────────────

async fn gestures(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| gesture_socket(socket, state))
}

async fn gesture_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut subscription = state.bus.subscribe(Some(EventFilter {
        source: Some(EventSource::Touch),
        event_type: Some(EV_ABS),
    }));
    let mut detector = SwipeDetector::new();

    loop {
        tokio::select! {
            event = subscription.recv() => match event {
                Some(event) => {
                    if let Some(direction) = detector.feed(&event) {
                        if socket
                            .send(Message::Text(direction.to_string()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
                None => break,
            },
            // Drain (and ignore) client traffic so a close is noticed even
            // while the touch panel is silent.
            message = socket.recv() => match message {
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
        }
    }
    state.bus.unsubscribe(subscription.token());
}
