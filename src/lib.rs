pub mod config;
pub mod db;
pub mod error;
pub mod heat;
pub mod hub;
pub mod models;
pub mod presence;
pub mod protocol;
pub mod retention;
pub mod routes;
pub mod validation;

use std::sync::Arc;

use config::Config;
use db::EventStore;
use hub::Hub;

/// Everything that can keep the server from starting at all. Both variants
/// are fatal: the caller logs and exits nonzero.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Store(#[from] error::StoreError),
}

/// Builds the Rocket instance from environment configuration. Must run
/// inside an active Tokio runtime (the background sweeps are spawned here).
pub fn build() -> Result<rocket::Rocket<rocket::Build>, StartupError> {
    let config = Config::from_env()?;
    build_with_config(config)
}

/// Same as [`build`], but with configuration supplied directly — used by
/// integration tests to point at a temporary database.
pub fn build_with_config(config: Config) -> Result<rocket::Rocket<rocket::Build>, StartupError> {
    let store = EventStore::open(&config.database_path)?;
    let heat = retention::replay_on_startup(&store, config.retention_days)?;
    let hub = Hub::new(config.clone(), Arc::new(store), heat);

    retention::spawn_sweeps(Arc::clone(&hub));

    let figment = rocket::Config::figment().merge(("port", config.port));

    Ok(rocket::custom(figment)
        .manage(config)
        .manage(hub)
        .register("/", rocket::catchers![routes::not_found])
        .mount("/", rocket::routes![routes::index, routes::ws_route]))
}
