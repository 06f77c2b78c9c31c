use actix_web::{web, App, HttpServer};
use change_feed::{ChangeFeed, RedisChangeFeed};
use direct_messaging_service::{
    config, db, error, logging,
    models::Message,
    routes,
    state::AppState,
    store::{MessageStore, PgMessageStore, PublishingStore},
};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = config::Config::from_env()?;

    let db = db::init_pool(&cfg)
        .await
        .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;

    let feed = RedisChangeFeed::new(&cfg.redis_url, cfg.feed_channel_prefix.clone())
        .await
        .map_err(|e| error::AppError::StartServer(format!("redis: {e}")))?
        .with_filter_columns(Message::TABLE, &Message::FEED_COLUMNS);
    let feed: Arc<dyn ChangeFeed> = Arc::new(feed);

    let store: Arc<dyn MessageStore> =
        Arc::new(PublishingStore::new(PgMessageStore::new(db), feed));
    let state = AppState::new(store);

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, prefix = %cfg.feed_channel_prefix, "Starting direct-messaging-service");

    HttpServer::new(move || {
        App::new()
            .wrap(tracing_actix_web::TracingLogger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure_routes)
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(format!("server: {e}")))
}
