use axum::Extension;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use flightline_application::{SessionHandle, SessionService};
use flightline_core::ClientIdentity;
use flightline_domain::{ClientMessage, SessionId};
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::state::AppState;

/// Upgrades the request and runs one client session over the socket.
pub async fn socket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(identity): Extension<ClientIdentity>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

/// Leaves every group when dropped, including on abnormal connection ends.
struct SessionMembership {
    service: SessionService,
    session_id: SessionId,
}

impl Drop for SessionMembership {
    fn drop(&mut self) {
        self.service.disconnect(self.session_id);
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: ClientIdentity) {
    let service = state.session_service;
    let (session, mut outbox) = SessionHandle::channel(state.session_outbox_capacity);
    let session_id = session.id();
    let membership = SessionMembership {
        service: service.clone(),
        session_id,
    };

    service.connect(&identity, &session).await;

    let (mut sink, mut stream) = socket.split();
    let send_task = tokio::spawn(async move {
        while let Some(message) = outbox.recv().await {
            let encoded = match serde_json::to_string(&message) {
                Ok(encoded) => encoded,
                Err(error) => {
                    warn!(
                        session_id = %session_id,
                        error = %error,
                        "failed to encode outbound message"
                    );
                    continue;
                }
            };

            if sink.send(Message::Text(encoded.into())).await.is_err() {
                debug!(session_id = %session_id, "socket sink closed");
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => handle_text(&service, &session, text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(error) => {
                debug!(session_id = %session_id, error = %error, "socket receive error");
                break;
            }
        }
    }

    drop(membership);
    send_task.abort();
}

async fn handle_text(service: &SessionService, session: &SessionHandle, text: &str) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(error) => {
            warn!(session_id = %session.id(), error = %error, "ignoring malformed client message");
            return;
        }
    };

    if let Err(error) = service.receive(session, message.payload.as_str()).await {
        debug!(session_id = %session.id(), error = %error, "client payload was rejected");
    }
}
