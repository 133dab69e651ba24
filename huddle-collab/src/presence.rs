use dashmap::DashMap;

use crate::{util::Id, PrimaryKey};

/// Marker type for gateway connection ids.
pub struct GatewayConnection;
pub type GatewayConnectionId = Id<GatewayConnection>;

/// Process-wide registry of which users currently hold a live gateway
/// connection. One entry per user, last writer wins when the same user
/// connects from a second device.
#[derive(Debug, Default)]
pub struct Presence {
    online: DashMap<PrimaryKey, GatewayConnectionId>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the user as online through the given connection.
    pub fn register(&self, user_id: PrimaryKey, connection_id: GatewayConnectionId) {
        self.online.insert(user_id, connection_id);
    }

    /// Clears the user's entry, but only if the departing connection still
    /// owns it. A disconnect from an older device must not evict the entry
    /// a newer connection wrote.
    pub fn unregister(&self, user_id: PrimaryKey, connection_id: GatewayConnectionId) {
        self.online
            .remove_if(&user_id, |_, current| *current == connection_id);
    }

    pub fn lookup(&self, user_id: PrimaryKey) -> Option<GatewayConnectionId> {
        self.online.get(&user_id).map(|entry| *entry)
    }

    pub fn is_online(&self, user_id: PrimaryKey) -> bool {
        self.online.contains_key(&user_id)
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }
}
