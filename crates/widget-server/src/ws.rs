//! WebSocket Endpoint

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt, future, stream::SplitSink};
use widget_hub::{ClientSink, Hub, HubError};

use crate::state::AppState;

/// Write half of an upgraded socket
struct WsSink(SplitSink<WebSocket, Message>);

#[async_trait]
impl ClientSink for WsSink {
    async fn send_text(&mut self, text: String) -> widget_hub::Result<()> {
        self.0
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| HubError::Write(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.0.close().await;
    }
}

/// Upgrade to a websocket registered with the notification hub
pub async fn ws_endpoint(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| serve_socket(socket, hub))
}

async fn serve_socket(socket: WebSocket, hub: Arc<Hub>) {
    let (sender, receiver) = socket.split();

    let id = match hub.register(Box::new(WsSink(sender))).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket acknowledgement failed");
            return;
        }
    };

    let inbound = receiver
        .take_while(|msg| future::ready(matches!(msg, Ok(m) if !matches!(m, Message::Close(_)))))
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(text.as_str().to_owned()),
                _ => None,
            })
        });

    hub.listen(id, inbound).await;
}
