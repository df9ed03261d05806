use anyhow::Result;
use clap::{Arg, Command};
use pingu::constants::{DEFAULT_SEED_USER_COUNT, SEED_PASSWORD};
use pingu::db::{get_db_pool, migrations, DatabaseConfig};
use pingu::models::NewUser;
use pingu::services::registration::hash_password;
use pingu::{utils, PairingEngine, PgUserStore, VersionedStore};
use tracing::{error, info, warn};

const USERNAMES: &[&str] = &[
    "alice", "bob", "dave", "eve", "frank", "grace", "hank", "iris", "jack", "kate",
    "leo", "mike", "nancy", "oliver", "peter", "quinn", "rachel", "sam", "tina", "ursula",
    "vick", "walt", "xander", "yara", "zane", "anna", "bill", "claire", "dan", "ella",
    "fred", "gina", "hannah", "ian", "jane", "ken", "linda", "mary", "noah", "oscar",
    "paul", "quincy", "rose", "sophie", "tom", "van", "will", "xena", "yuki",
];

#[tokio::main]
async fn main() -> Result<()> {
    utils::init_logging();

    let matches = Command::new("seed")
        .about("Seed the users table with generated accounts")
        .arg(
            Arg::new("count")
                .long("count")
                .help("Number of users to create (default 100)")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("pair")
                .long("pair")
                .help("Partner consecutive seeded users with each other")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let count = matches.get_one::<usize>("count").copied().unwrap_or(DEFAULT_SEED_USER_COUNT);
    let pair = matches.get_flag("pair");

    let db_config = DatabaseConfig::from_env()?;
    let pool = get_db_pool(&db_config).await?;
    migrations::run_migrations(&pool).await?;

    let store = PgUserStore::new(pool, db_config.query_timeout);

    // One hash for every seeded account; argon2 is deliberately slow.
    let password_hash = hash_password(SEED_PASSWORD)?;
    let users = generate_users(count, &password_hash);

    let created = match store.create_batch(users).await {
        Ok(created) => created,
        Err(e) => {
            error!("Error creating users, nothing was seeded: {}", e);
            return Err(e.into());
        }
    };
    info!("Created {} users", created.len());

    if pair {
        let engine = PairingEngine::new(store);
        let mut paired = 0;
        for chunk in created.chunks_exact(2) {
            match engine.partner(&chunk[0], &chunk[1]).await {
                Ok(_) => paired += 1,
                Err(e) => warn!("Could not partner {} and {}: {}", chunk[0].id, chunk[1].id, e),
            }
        }
        info!("Partnered {} pairs", paired);
    }

    info!("Seeding complete");
    Ok(())
}

fn generate_users(n: usize, password_hash: &str) -> Vec<NewUser> {
    (0..n)
        .map(|i| {
            let name = format!("{}{}", USERNAMES[i % USERNAMES.len()], i);
            NewUser {
                email: format!("{}@example.com", name),
                username: name,
                password_hash: password_hash.to_string(),
            }
        })
        .collect()
}
