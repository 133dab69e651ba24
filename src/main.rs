use std::env;

use huddle_collab::{Collab, PgDatabase};
use huddle_server::run_server;
use log::info;

mod logging;

#[tokio::main]
async fn main() {
    logging::init_logger();

    let database_url = env::var("HUDDLE_DATABASE_URL").expect("HUDDLE_DATABASE_URL is set");

    let database = PgDatabase::new(&database_url)
        .await
        .expect("database connects");

    info!("Connected to database");

    run_server(Collab::new(database)).await
}
