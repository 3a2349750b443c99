pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod repository;
pub mod routes;
pub mod storage;
pub mod validation;

pub use routes::configure;
