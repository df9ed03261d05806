pub mod connection;
pub mod memory;
pub mod migrations;
pub mod postgres;
pub mod store;
pub mod unit_of_work;

pub use connection::{get_db_pool, DatabaseConfig};
pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;
pub use store::{Mutation, StoreError, StoreResult, UniqueField, VersionedStore};
pub use unit_of_work::{Step, UnitOfWork};
