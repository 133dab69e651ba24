use crossbeam::channel::{Receiver, Sender};

use crate::{MemberRole, MessageData, PrimaryKey, RoomMemberData};

pub type EventSender = Sender<CollabEvent>;
pub type EventReceiver = Receiver<CollabEvent>;

/// Events emitted by the collab system, consumed by the realtime gateway.
#[derive(Debug, Clone)]
pub enum CollabEvent {
    /// A message was persisted and should fan out to the room
    MessageSent {
        room_id: PrimaryKey,
        message: MessageData,
    },
    /// User became a member of a room
    MemberJoined {
        room_id: PrimaryKey,
        new_member: RoomMemberData,
    },
    /// User left, or was removed from, a room
    MemberLeft {
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    },
    /// A member's role changed
    RoleChanged {
        room_id: PrimaryKey,
        user_id: PrimaryKey,
        new_role: MemberRole,
    },
    /// Ownership of a room moved to another member
    OwnerTransferred {
        room_id: PrimaryKey,
        from_user: PrimaryKey,
        to_user: PrimaryKey,
    },
    /// A room was renamed
    RoomRenamed {
        room_id: PrimaryKey,
        new_name: String,
    },
}
