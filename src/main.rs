//! Process entry point: wires `bearoff`'s library modules into a running
//! actix-web server. No subcommands, no flags — see `bearoff::config`.

use actix::Actor;
use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use std::sync::Mutex;
use std::time::Duration;

use bearoff::config::Config;
use bearoff::identity::IdentityStore;
use bearoff::rooms::{MatchmakingQueue, RoomRegistry};
use bearoff::storage::{self, Storage};
use bearoff::ws::{self, AppState, SessionRegistry};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    run_server(config).await
}

async fn run_server(config: Config) -> std::io::Result<()> {
    let storage = Storage::new(&config.data_dir)?;

    let mut identity = IdentityStore::new();
    identity
        .restore(&storage)
        .map_err(|e| std::io::Error::other(format!("failed to restore guests: {e}")))?;

    let registry = SessionRegistry::default().start();

    let app_state = web::Data::new(AppState {
        registry,
        identity: Mutex::new(identity),
        rooms: Mutex::new(RoomRegistry::new()),
        queue: Mutex::new(MatchmakingQueue::new()),
        storage,
        config: config.clone(),
    });

    spawn_disconnect_sweeper(app_state.clone());

    log::info!("bearoff listening on 0.0.0.0:{}", config.port);
    log::info!("allowed origin: {}", config.allowed_origin);
    log::info!("data directory: {}", config.data_dir);

    let bind_port = config.port;
    let allowed_origin = config.allowed_origin.clone();

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&allowed_origin)
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(app_state.clone())
            .route("/ws", web::get().to(ws::ws_connect))
    })
    .bind(("0.0.0.0", bind_port))?
    .run()
    .await
}

/// Periodically removes rooms whose disconnect grace period has elapsed.
/// This never forfeits a game in progress — it only garbage-collects
/// rooms both players have left for good.
fn spawn_disconnect_sweeper(app_state: web::Data<AppState>) {
    actix_web::rt::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(5));
        loop {
            ticker.tick().await;
            let now = storage::unix_timestamp();
            let expired = app_state.rooms.lock().unwrap().sweep_expired(now);
            for room_id in expired {
                log::info!("room {room_id} garbage-collected after disconnect grace period");
            }
        }
    });
}
