use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::frames::ServerFrame;

/// Outbound messages are serialized once (spec.md §4.5: "serialize message
/// once, then attempt non-blocking enqueue on every connection") and handed
/// to each connection's buffer as a shared, already-encoded JSON string.
pub type Outbound = Arc<str>;

/// Bounded per-connection buffer capacity (spec.md §5).
pub const CONNECTION_BUFFER_CAPACITY: usize = 256;

/// What a connection's read pump supplies when it comes online.
pub struct Registration {
    pub connection_id: Uuid,
    pub user_id: Uuid,
    pub auction_room: Option<Uuid>,
    pub chat_room: Option<String>,
    pub sender: mpsc::Sender<Outbound>,
}

struct ConnectionMeta {
    user_id: Uuid,
    auction_room: Option<Uuid>,
    chat_room: Option<String>,
}

#[derive(Default)]
struct Indices {
    by_user: HashMap<Uuid, (Uuid, mpsc::Sender<Outbound>)>,
    by_auction_room: HashMap<Uuid, HashMap<Uuid, mpsc::Sender<Outbound>>>,
    by_chat_room: HashMap<String, HashMap<Uuid, mpsc::Sender<Outbound>>>,
    connections: HashMap<Uuid, ConnectionMeta>,
}

enum HubCommand {
    Register(Registration),
    Unregister(Uuid),
}

/// Process-local registry of live connections (spec.md §4.5). Three
/// indices share one `RwLock`; a single owning task, spawned by `Hub::spawn`,
/// is the only mutator. Fan-out methods take a read lock just long enough to
/// snapshot the relevant senders, then enqueue outside the lock.
#[derive(Clone)]
pub struct Hub {
    index: Arc<RwLock<Indices>>,
    commands: mpsc::Sender<HubCommand>,
}

impl Hub {
    /// Spawns the owning task and returns a `Hub` handle. The task runs
    /// until every `Hub` clone (and its `commands` sender) is dropped.
    pub fn spawn() -> Self {
        let index = Arc::new(RwLock::new(Indices::default()));
        let (commands, mut rx) = mpsc::channel::<HubCommand>(1024);

        let owning_index = index.clone();
        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    HubCommand::Register(reg) => {
                        let mut idx = owning_index.write().await;
                        idx.connections.insert(
                            reg.connection_id,
                            ConnectionMeta {
                                user_id: reg.user_id,
                                auction_room: reg.auction_room,
                                chat_room: reg.chat_room.clone(),
                            },
                        );
                        // Last-writer-wins on the user index (spec.md §4.5).
                        idx.by_user
                            .insert(reg.user_id, (reg.connection_id, reg.sender.clone()));
                        if let Some(auction_id) = reg.auction_room {
                            idx.by_auction_room
                                .entry(auction_id)
                                .or_default()
                                .insert(reg.connection_id, reg.sender.clone());
                        }
                        if let Some(room_id) = reg.chat_room {
                            idx.by_chat_room
                                .entry(room_id)
                                .or_default()
                                .insert(reg.connection_id, reg.sender);
                        }
                    }
                    HubCommand::Unregister(connection_id) => {
                        let mut idx = owning_index.write().await;
                        let Some(meta) = idx.connections.remove(&connection_id) else {
                            continue;
                        };
                        if let Some((current_id, _)) = idx.by_user.get(&meta.user_id) {
                            if *current_id == connection_id {
                                idx.by_user.remove(&meta.user_id);
                            }
                        }
                        if let Some(auction_id) = meta.auction_room {
                            if let Some(room) = idx.by_auction_room.get_mut(&auction_id) {
                                room.remove(&connection_id);
                                if room.is_empty() {
                                    idx.by_auction_room.remove(&auction_id);
                                }
                            }
                        }
                        if let Some(room_id) = meta.chat_room {
                            if let Some(room) = idx.by_chat_room.get_mut(&room_id) {
                                room.remove(&connection_id);
                                if room.is_empty() {
                                    idx.by_chat_room.remove(&room_id);
                                }
                            }
                        }
                        // All `Sender` clones the indices held are now
                        // dropped; once the connection's own register call
                        // also drops its clone, the channel closes and the
                        // write pump's `recv()` returns `None` exactly once.
                    }
                }
            }
        });

        Hub { index, commands }
    }

    pub async fn register(&self, registration: Registration) {
        let _ = self.commands.send(HubCommand::Register(registration)).await;
    }

    pub async fn unregister(&self, connection_id: Uuid) {
        let _ = self.commands.send(HubCommand::Unregister(connection_id)).await;
    }

    fn encode(frame: &ServerFrame) -> Outbound {
        match serde_json::to_string(frame) {
            Ok(json) => Arc::from(json),
            Err(err) => {
                tracing::error!(?err, "failed to serialize outbound frame");
                Arc::from("{}")
            }
        }
    }

    /// `BroadcastToAuction(auctionID, message)` (spec.md §4.5).
    pub async fn broadcast_to_auction(&self, auction_id: Uuid, frame: &ServerFrame) {
        let encoded = Self::encode(frame);
        let senders: Vec<mpsc::Sender<Outbound>> = {
            let idx = self.index.read().await;
            match idx.by_auction_room.get(&auction_id) {
                Some(room) => room.values().cloned().collect(),
                None => return,
            }
        };
        for sender in senders {
            // Drop silently if the buffer is full (slow-client policy).
            let _ = sender.try_send(encoded.clone());
        }
    }

    /// `SendToUser(userID, message)` (spec.md §4.5). Silent no-op if the
    /// user is not connected.
    pub async fn send_to_user(&self, user_id: Uuid, frame: &ServerFrame) {
        let encoded = Self::encode(frame);
        let sender = {
            let idx = self.index.read().await;
            idx.by_user.get(&user_id).map(|(_, s)| s.clone())
        };
        if let Some(sender) = sender {
            let _ = sender.try_send(encoded);
        }
    }

    /// `BroadcastToChat(roomID, message)` (spec.md §4.5).
    pub async fn broadcast_to_chat(&self, room_id: &str, frame: &ServerFrame) {
        let encoded = Self::encode(frame);
        let senders: Vec<mpsc::Sender<Outbound>> = {
            let idx = self.index.read().await;
            match idx.by_chat_room.get(room_id) {
                Some(room) => room.values().cloned().collect(),
                None => return,
            }
        };
        for sender in senders {
            let _ = sender.try_send(encoded.clone());
        }
    }

    /// Whether the caller's id is a participant of this chat room, decided
    /// by substring match on the canonical room id (spec.md §6, §9).
    pub fn authorize_chat_room(caller: Uuid, room_id: &str) -> bool {
        room_id.contains(&caller.to_string())
    }
}

pub fn new_connection_channel() -> (mpsc::Sender<Outbound>, mpsc::Receiver<Outbound>) {
    mpsc::channel(CONNECTION_BUFFER_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::BroadcastNewBid;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tokio::time::{sleep, Duration};

    async fn settle() {
        // Give the owning task a turn to drain its channel.
        sleep(Duration::from_millis(10)).await;
    }

    fn sample_frame(auction_id: Uuid) -> ServerFrame {
        ServerFrame::BroadcastNewBid(BroadcastNewBid {
            auction_id,
            amount: dec!(10.00),
            bidder_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribed_connection_and_skips_others() {
        let hub = Hub::spawn();
        let auction_id = Uuid::new_v4();
        let (tx, mut rx) = new_connection_channel();
        hub.register(Registration {
            connection_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            auction_room: Some(auction_id),
            chat_room: None,
            sender: tx,
        })
        .await;
        settle().await;

        hub.broadcast_to_auction(auction_id, &sample_frame(auction_id)).await;
        let received = rx.try_recv();
        assert!(received.is_ok());

        // A different auction room receives nothing, and no panic occurs.
        hub.broadcast_to_auction(Uuid::new_v4(), &sample_frame(auction_id)).await;
    }

    #[tokio::test]
    async fn send_to_user_is_a_silent_no_op_when_disconnected() {
        let hub = Hub::spawn();
        // No panic, no send target.
        hub.send_to_user(Uuid::new_v4(), &sample_frame(Uuid::new_v4())).await;
    }

    #[tokio::test]
    async fn full_buffer_drops_the_message_instead_of_blocking() {
        let hub = Hub::spawn();
        let auction_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel::<Outbound>(1);
        hub.register(Registration {
            connection_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            auction_room: Some(auction_id),
            chat_room: None,
            sender: tx,
        })
        .await;
        settle().await;

        hub.broadcast_to_auction(auction_id, &sample_frame(auction_id)).await;
        // Buffer (capacity 1) is now full; this second send must drop
        // silently rather than block the broadcaster.
        hub.broadcast_to_auction(auction_id, &sample_frame(auction_id)).await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_closes_the_outbound_buffer_exactly_once() {
        let hub = Hub::spawn();
        let connection_id = Uuid::new_v4();
        let (tx, mut rx) = new_connection_channel();
        hub.register(Registration {
            connection_id,
            user_id: Uuid::new_v4(),
            auction_room: None,
            chat_room: None,
            sender: tx,
        })
        .await;
        settle().await;

        hub.unregister(connection_id).await;
        settle().await;

        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn chat_authorization_is_substring_of_room_id() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let room = ledger::canonical_room_id(a, b);
        assert!(Hub::authorize_chat_room(a, &room));
        assert!(Hub::authorize_chat_room(b, &room));
        assert!(!Hub::authorize_chat_room(Uuid::new_v4(), &room));
    }
}
