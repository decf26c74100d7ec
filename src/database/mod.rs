pub mod manager;
pub mod migrations;
pub mod seed;

pub use manager::{close, connect, DatabaseError};
pub use seed::{bootstrap, SeedReport};
