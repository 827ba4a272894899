pub mod models;
pub mod queries;

pub use models::StoredOptions;
pub use queries::{init_db, DbPool, OptionsRepo, SqliteBackend};
