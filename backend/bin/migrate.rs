use pingu::{utils, get_db_pool};
use pingu::db::{migrations, DatabaseConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    utils::init_logging();

    let db_config = DatabaseConfig::from_env()?;
    let pool = get_db_pool(&db_config).await?;

    println!("Running database migrations...");
    migrations::run_migrations(&pool).await?;
    println!("Migrations completed successfully!");

    Ok(())
}
