//! SQLite database driver implementation

mod connection;
mod driver;

pub use connection::{SqliteCancelHandle, SqliteConnection, SqliteTransaction};
pub use driver::SqliteDriver;
