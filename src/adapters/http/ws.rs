use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::adapters::http::state::HttpState;
use crate::domain::stream::{StreamEvent, WsMessage};

pub async fn ws_handler(ws: WebSocketUpgrade, State(st): State<HttpState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, st))
}

/// Cada frame sale como un mensaje JSON `frame` seguido del JPEG binario.
async fn handle_socket(mut socket: WebSocket, st: HttpState) {
    let mut rx = st.session.subscribe();
    info!("🔌 Cliente de stream conectado");

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(StreamEvent::Frame { meta, jpeg }) => {
                    let Ok(json) = serde_json::to_string(&WsMessage::Frame { meta }) else { continue };
                    if socket.send(Message::Text(json.into())).await.is_err() { break; }
                    if socket.send(Message::Binary(jpeg.into())).await.is_err() { break; }
                }
                Ok(StreamEvent::Status { level, message }) => {
                    let Ok(json) = serde_json::to_string(&WsMessage::Status { level, message }) else { continue };
                    if socket.send(Message::Text(json.into())).await.is_err() { break; }
                }
                // Cliente lento: se salta lo que se perdió.
                Err(RecvError::Lagged(n)) => debug!("cliente de stream retrasado, {} eventos descartados", n),
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    info!("🔌 Cliente de stream desconectado");
}
