mod auth;
mod chat;
mod db;
mod events;
mod invites;
mod moderation;
mod presence;
mod rooms;
mod teams;
mod util;

use std::sync::Arc;

use crossbeam::channel::unbounded;

pub use auth::*;
pub use chat::*;
pub use db::*;
pub use events::*;
pub use invites::*;
pub use moderation::*;
pub use presence::*;
pub use rooms::*;
pub use teams::*;
pub use util::*;

/// The huddle collab system, facilitating team and room governance,
/// invitations, chat, and authentication.
pub struct Collab<Db> {
    pub auth: Auth<Db>,
    pub rooms: RoomManager<Db>,
    pub teams: TeamManager<Db>,
    pub invites: InviteEngine<Db>,
    pub chat: ChatService<Db>,
    pub presence: Arc<Presence>,

    database: Arc<Db>,
    events: EventReceiver,
}

/// A type passed to the components of the collab system, to access the
/// database, the moderation gate, and the event bus.
pub struct CollabContext<Db> {
    pub database: Arc<Db>,
    pub moderation: Arc<ModerationGate>,
    pub events: EventSender,
}

impl<Db> Collab<Db>
where
    Db: Database,
{
    pub fn new(database: Db) -> Self {
        let database = Arc::new(database);
        let (events_tx, events_rx) = unbounded();

        let context = CollabContext {
            database: database.clone(),
            moderation: Arc::new(ModerationGate::new()),
            events: events_tx,
        };

        Self {
            auth: Auth::new(&database),
            rooms: RoomManager::new(&context),
            teams: TeamManager::new(&context),
            invites: InviteEngine::new(&context),
            chat: ChatService::new(&context),
            presence: Arc::new(Presence::new()),
            database,
            events: events_rx,
        }
    }

    /// A receiver for the events the collab system emits. Consumed by the
    /// realtime gateway to fan messages out to connected clients.
    pub fn events(&self) -> EventReceiver {
        self.events.clone()
    }

    pub fn database(&self) -> &Arc<Db> {
        &self.database
    }
}

impl<Db> CollabContext<Db>
where
    Db: Database,
{
    /// Emits an event onto the bus. Nobody listening is not an error.
    pub fn emit(&self, event: CollabEvent) {
        let _ = self.events.send(event);
    }
}

impl<Db> Clone for CollabContext<Db> {
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
            moderation: self.moderation.clone(),
            events: self.events.clone(),
        }
    }
}

#[cfg(test)]
impl CollabContext<MemoryDatabase> {
    /// A fresh context over the in-memory database, for unit tests.
    pub fn test() -> (Self, EventReceiver) {
        let (events_tx, events_rx) = unbounded();

        let context = Self {
            database: Arc::new(MemoryDatabase::new()),
            moderation: Arc::new(ModerationGate::new()),
            events: events_tx,
        };

        (context, events_rx)
    }
}
