pub mod codec;
pub mod connection;
pub mod constraints;
pub mod error;
pub mod relations;
pub mod repositories;
pub mod schema;

pub use connection::{Database, DbConnection, DbPool};
pub use constraints::CascadeReport;
pub use error::{ErrorKind, StoreError, StoreResult};
pub use schema::Schema;
