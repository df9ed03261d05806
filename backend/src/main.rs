use pingu::{
    db::{self, DatabaseConfig},
    get_db_pool, handlers, utils, Config, PairingEngine, PgUserStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    utils::init_logging();

    let config = Config::from_env()?;
    let db_config = DatabaseConfig::from_env()?;
    let pool = get_db_pool(&db_config).await?;

    // Run migrations
    db::migrations::run_migrations(&pool).await?;

    let port = config.port;
    let engine = PairingEngine::new(PgUserStore::new(pool, db_config.query_timeout));
    let app = handlers::create_router(engine, config);

    let listener = tokio::net::TcpListener::bind(&format!("0.0.0.0:{}", port)).await?;
    tracing::info!("Server running on port {}", port);

    axum::serve(listener, app).await?;

    Ok(())
}
