use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use huddle_collab::{
    ChatError, CollabEvent, GatewayConnectionId, Presence, UserData,
};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{
    context::{Collab, ServerContext},
    errors::{ServerError, ServerResult},
    serialized::{Message, RoomMember, ToSerialized},
    Router,
};

/// Manages realtime connections: who is connected to which room, presence
/// bookkeeping, and per-room fan-out of events.
pub struct Gateway {
    presence: Arc<Presence>,
    connections: Mutex<Vec<Connection>>,
}

struct Connection {
    id: GatewayConnectionId,
    room_id: i32,
    user_id: i32,
    sender: mpsc::UnboundedSender<GatewayEvent>,
}

/// Events the gateway pushes to clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum GatewayEvent {
    /// The persisted message, delivered to every connection bound to the
    /// room, the sender's own included
    #[serde(rename = "receive:message")]
    ReceiveMessage { message: Message },
    /// Delivered only to the connection whose send failed
    #[serde(rename = "message:error", rename_all = "camelCase")]
    MessageError {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        forbidden_words: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        first_word: Option<String>,
    },
    #[serde(rename = "member:joined")]
    MemberJoined { room_id: i32, member: RoomMember },
    #[serde(rename = "member:left")]
    MemberLeft { room_id: i32, user_id: i32 },
    #[serde(rename = "role:changed")]
    RoleChanged {
        room_id: i32,
        user_id: i32,
        role: String,
    },
    #[serde(rename = "owner:transferred")]
    OwnerTransferred {
        room_id: i32,
        from_user: i32,
        to_user: i32,
    },
    #[serde(rename = "room:renamed")]
    RoomRenamed { room_id: i32, name: String },
}

/// Events clients send to the gateway
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ClientEvent {
    #[serde(rename = "send:message")]
    SendMessage { content: String },
}

#[derive(Debug, Deserialize)]
pub struct GatewayParams {
    token: String,
    room_id: i32,
}

impl Gateway {
    pub fn new(presence: &Arc<Presence>) -> Arc<Self> {
        Arc::new(Self {
            presence: presence.clone(),
            connections: Default::default(),
        })
    }

    /// Forwards a collab event to every connection bound to its room.
    pub fn handle_collab_event(&self, event: CollabEvent) {
        match event {
            CollabEvent::MessageSent { room_id, message } => self.broadcast_to_room(
                room_id,
                GatewayEvent::ReceiveMessage {
                    message: message.to_serialized(),
                },
            ),
            CollabEvent::MemberJoined {
                room_id,
                new_member,
            } => self.broadcast_to_room(
                room_id,
                GatewayEvent::MemberJoined {
                    room_id,
                    member: new_member.to_serialized(),
                },
            ),
            CollabEvent::MemberLeft { room_id, user_id } => {
                self.broadcast_to_room(room_id, GatewayEvent::MemberLeft { room_id, user_id })
            }
            CollabEvent::RoleChanged {
                room_id,
                user_id,
                new_role,
            } => self.broadcast_to_room(
                room_id,
                GatewayEvent::RoleChanged {
                    room_id,
                    user_id,
                    role: crate::serialized::role_str(new_role).to_string(),
                },
            ),
            CollabEvent::OwnerTransferred {
                room_id,
                from_user,
                to_user,
            } => self.broadcast_to_room(
                room_id,
                GatewayEvent::OwnerTransferred {
                    room_id,
                    from_user,
                    to_user,
                },
            ),
            CollabEvent::RoomRenamed { room_id, new_name } => self.broadcast_to_room(
                room_id,
                GatewayEvent::RoomRenamed {
                    room_id,
                    name: new_name,
                },
            ),
        }
    }

    /// Registers a connection bound to a room and marks the user online.
    /// Returns the connection id and the receiving half the socket writer
    /// drains.
    fn connect(
        &self,
        room_id: i32,
        user_id: i32,
    ) -> (GatewayConnectionId, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();

        let connection = Connection {
            id: GatewayConnectionId::new(),
            room_id,
            user_id,
            sender,
        };
        let connection_id = connection.id;

        self.connections.lock().push(connection);
        self.presence.register(user_id, connection_id);

        (connection_id, receiver)
    }

    /// Removes the connection and clears presence, unless a newer
    /// connection took the user's entry over in the meantime.
    fn disconnect(&self, connection_id: GatewayConnectionId) {
        let mut connections = self.connections.lock();

        if let Some(position) = connections.iter().position(|c| c.id == connection_id) {
            let connection = connections.swap_remove(position);
            self.presence.unregister(connection.user_id, connection.id);
        }
    }

    fn broadcast_to_room(&self, room_id: i32, event: GatewayEvent) {
        let connections = self.connections.lock();

        for connection in connections.iter().filter(|c| c.room_id == room_id) {
            // A closed receiver just means the socket task is shutting down
            let _ = connection.sender.send(event.clone());
        }
    }

    /// Delivers an event to a single connection, never the whole room.
    fn send_to(&self, connection_id: GatewayConnectionId, event: GatewayEvent) {
        let connections = self.connections.lock();

        if let Some(connection) = connections.iter().find(|c| c.id == connection_id) {
            let _ = connection.sender.send(event);
        }
    }

}

#[utoipa::path(
    get,
    path = "/gateway",
    tag = "gateway",
    responses(
        (status = 101, description = "Connection upgraded to a websocket bound to the room"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Not a member of the room"),
        (status = 404, description = "Room does not exist")
    )
)]
pub(crate) async fn gateway_handshake(
    ws: WebSocketUpgrade,
    Query(params): Query<GatewayParams>,
    State(context): State<ServerContext>,
) -> ServerResult<Response> {
    // Authenticate, resolve, and authorize before the upgrade; a rejected
    // handshake never touches the presence registry
    let session = context
        .collab
        .auth
        .session(&params.token)
        .await
        .map_err(|_| ServerError::AuthFailed("Invalid or missing token"))?;

    let room = context.collab.rooms.room_by_id(params.room_id).await?;

    context
        .collab
        .rooms
        .require_member(room.id, session.user.id)
        .await?;

    let gateway = context.gateway.clone();
    let collab = context.collab.clone();
    let user = session.user;

    Ok(ws.on_upgrade(move |socket| handle_socket(gateway, collab, socket, room.id, user)))
}

async fn handle_socket(
    gateway: Arc<Gateway>,
    collab: Arc<Collab>,
    socket: WebSocket,
    room_id: i32,
    user: UserData,
) {
    let (connection_id, mut outgoing) = gateway.connect(room_id, user.id);

    info!(
        "User {} connected to room {} via the gateway",
        user.username, room_id
    );

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(event) = outgoing.recv().await {
            let payload = serde_json::to_string(&event).expect("gateway events serialize");

            if ws_sender.send(WsMessage::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = ws_receiver.next().await {
        let message = match message {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let event: ClientEvent = match serde_json::from_str(&message) {
            Ok(event) => event,
            Err(e) => {
                debug!("Dropping malformed gateway event: {e}");

                gateway.send_to(
                    connection_id,
                    GatewayEvent::MessageError {
                        message: "Malformed event".to_string(),
                        forbidden_words: None,
                        first_word: None,
                    },
                );

                continue;
            }
        };

        match event {
            ClientEvent::SendMessage { content } => {
                // The happy path stays quiet here; the broadcast comes back
                // through the event bus and includes this connection
                match collab.chat.send_message(room_id, &user, &content).await {
                    Ok(_) => {}
                    Err(ChatError::Flagged(error)) => {
                        warn!(
                            "User {} sent flagged content to room {}",
                            user.username, room_id
                        );

                        gateway.send_to(
                            connection_id,
                            GatewayEvent::MessageError {
                                message: error.to_string(),
                                first_word: error.first_word().map(|w| w.to_string()),
                                forbidden_words: Some(error.words),
                            },
                        );
                    }
                    Err(e) => gateway.send_to(
                        connection_id,
                        GatewayEvent::MessageError {
                            message: e.to_string(),
                            forbidden_words: None,
                            first_word: None,
                        },
                    ),
                }
            }
        }
    }

    writer.abort();
    gateway.disconnect(connection_id);

    info!(
        "User {} disconnected from room {}",
        user.username, room_id
    );
}

pub fn router() -> Router {
    Router::new().route("/", get(gateway_handshake))
}

#[cfg(test)]
mod test {
    use super::*;
    use huddle_collab::{MessageData, UserData};

    fn gateway() -> Arc<Gateway> {
        Gateway::new(&Arc::new(Presence::new()))
    }

    fn message(room_id: i32) -> MessageData {
        MessageData {
            id: 1,
            room_id,
            sender: UserData {
                id: 7,
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password: "hash".to_string(),
                display_name: "Alice".to_string(),
                superuser: false,
                team_id: None,
            },
            content: "hello".to_string(),
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_the_room_including_the_sender() {
        let gateway = gateway();

        let (_, mut alice_rx) = gateway.connect(1, 7);
        let (_, mut bob_rx) = gateway.connect(1, 8);
        let (_, mut other_room_rx) = gateway.connect(2, 9);

        gateway.handle_collab_event(CollabEvent::MessageSent {
            room_id: 1,
            message: message(1),
        });

        assert!(alice_rx.try_recv().is_ok(), "sender gets the echo");
        assert!(bob_rx.try_recv().is_ok(), "room members get the message");
        assert!(
            other_room_rx.try_recv().is_err(),
            "other rooms hear nothing"
        );
    }

    #[tokio::test]
    async fn test_private_errors_are_not_broadcast() {
        let gateway = gateway();

        let (alice_id, mut alice_rx) = gateway.connect(1, 7);
        let (_, mut bob_rx) = gateway.connect(1, 8);

        gateway.send_to(
            alice_id,
            GatewayEvent::MessageError {
                message: "flagged".to_string(),
                forbidden_words: Some(vec!["moron".to_string()]),
                first_word: Some("moron".to_string()),
            },
        );

        assert!(alice_rx.try_recv().is_ok());
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_clears_presence_conditionally() {
        let gateway = gateway();

        let (first, _rx1) = gateway.connect(1, 7);
        let (second, _rx2) = gateway.connect(1, 7);

        // Presence points at the latest connection
        assert_eq!(gateway.presence.lookup(7), Some(second));

        // The older connection going away must not clear the newer entry
        gateway.disconnect(first);
        assert!(gateway.presence.is_online(7));

        gateway.disconnect(second);
        assert!(!gateway.presence.is_online(7));
    }

    #[test]
    fn test_gateway_event_wire_shape() {
        let event = GatewayEvent::MessageError {
            message: "content contains forbidden words: moron".to_string(),
            forbidden_words: Some(vec!["moron".to_string()]),
            first_word: Some("moron".to_string()),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "message:error");
        assert_eq!(value["forbiddenWords"][0], "moron");
        assert_eq!(value["firstWord"], "moron");

        let event = GatewayEvent::ReceiveMessage {
            message: message(1).to_serialized(),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "receive:message");
        assert_eq!(value["message"]["content"], "hello");
        // Credentials never leave the server
        assert!(value["message"]["sender"].get("password").is_none());
    }
}
