use std::sync::Arc;

use axum::extract::FromRef;
use huddle_collab::PgDatabase;

use crate::gateway::Gateway;

/// The collab system the server exposes, bound to postgres.
pub type Collab = huddle_collab::Collab<PgDatabase>;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub collab: Arc<Collab>,
    pub gateway: Arc<Gateway>,
}
