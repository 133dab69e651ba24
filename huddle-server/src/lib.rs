mod auth;
mod context;
mod docs;
mod errors;
mod gateway;
mod invites;
mod rooms;
mod schemas;
mod serialized;
mod teams;

use std::{
    env,
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
};

use log::info;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use axum::routing::get;

pub use context::{Collab, ServerContext};
pub use gateway::{Gateway, GatewayEvent};

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;

pub type Router = axum::Router<ServerContext>;

/// Starts the huddle server over an initialized collab system.
pub async fn run_server(collab: Collab) {
    let port = env::var("HUDDLE_SERVER_PORT")
        .map(|x| x.parse::<u16>().expect("Port must be a number"))
        .unwrap_or(DEFAULT_PORT);

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let collab = Arc::new(collab);
    let gateway = Gateway::new(&collab.presence);

    spawn_event_pump(&collab, &gateway);

    let context = ServerContext {
        collab,
        gateway,
    };

    let app = Router::new()
        .nest("/auth", auth::router())
        .nest("/chatrooms", rooms::router())
        .nest("/teams", teams::router())
        .nest("/invite", invites::router())
        .nest("/gateway", gateway::router())
        .route("/api.json", get(docs::docs))
        .layer(cors)
        .with_state(context);

    let listener = TcpListener::bind(&addr).await.expect("listens on address");

    info!("Listening on port {}", port);

    axum::serve(listener, app.into_make_service())
        .await
        .expect("server runs");
}

/// Drains the collab event bus into the gateway. The bus is a blocking
/// crossbeam channel, so the pump lives on the blocking pool.
fn spawn_event_pump(collab: &Arc<Collab>, gateway: &Arc<Gateway>) {
    let events = collab.events();
    let gateway = gateway.clone();

    tokio::task::spawn_blocking(move || {
        while let Ok(event) = events.recv() {
            gateway.handle_collab_event(event);
        }
    });
}
