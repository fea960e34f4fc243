// Library exports for the Tennis Encounter backend
// Shared by the server and the manage binary

pub mod config;
pub mod database;
pub mod dialect;
pub mod entity;
pub mod error;
pub mod guid;
pub mod models;
pub mod query;
pub mod repository;
pub mod routes;
pub mod serialize;

pub use database::Database;
pub use dialect::Dialect;
pub use error::{DbResult, ErrorCode};
pub use query::Filter;
pub use repository::{Fetched, Repository};
