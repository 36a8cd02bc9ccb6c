use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use hub::registry::{new_connection_channel, Registration};
use hub::{parse_client_frame, chat, ClientFrame};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub user_id: Uuid,
    pub auction_id: Option<Uuid>,
    pub room_id: Option<String>,
}

/// Single WebSocket endpoint (spec.md §6), query parameters
/// `user_id`/`auction_id?`/`room_id?`.
pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

async fn handle_socket(socket: WebSocket, state: AppState, query: WsQuery) {
    let connection_id = Uuid::new_v4();
    let (outbound_tx, mut outbound_rx) = new_connection_channel();

    state
        .hub
        .register(Registration {
            connection_id,
            user_id: query.user_id,
            auction_room: query.auction_id,
            chat_room: query.room_id.clone(),
            sender: outbound_tx,
        })
        .await;

    let (mut sink, mut stream) = socket.split();

    let write_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sink.send(Message::Text(message.to_string())).await.is_err() {
                break;
            }
        }
    });

    let read_task = {
        let state = state.clone();
        let room_id = query.room_id.clone();
        let user_id = query.user_id;
        tokio::spawn(async move {
            while let Some(Ok(message)) = stream.next().await {
                let Message::Text(text) = message else {
                    continue;
                };
                match parse_client_frame(&text) {
                    ClientFrame::ChatSend(payload) => {
                        if let Some(room_id) = &room_id {
                            chat::handle_chat_send(
                                state.ledger.as_ref(),
                                &state.hub,
                                room_id,
                                user_id,
                                payload,
                            )
                            .await;
                        }
                    }
                    ClientFrame::Unknown => {}
                }
            }
        })
    };

    // Either side ending the connection triggers the other; unregister is
    // sent exactly once regardless of which side failed first.
    tokio::select! {
        _ = write_task => {}
        _ = read_task => {}
    }
    state.hub.unregister(connection_id).await;
}
