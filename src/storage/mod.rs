pub mod db;
pub mod files;
pub mod folders;
pub mod models;
pub mod sessions;
pub mod shares;
pub mod sync_events;
mod tables;
pub mod user_shares;
pub mod versions;

pub use db::{Database, DatabaseError, Reader};
pub use tables::*;
