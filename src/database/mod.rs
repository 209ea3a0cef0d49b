pub mod manager;
pub mod models;
pub mod repository;

pub use manager::{DatabaseError, DatabaseManager, StoreConnector};
pub use repository::{PgStore, SchoolStore};
