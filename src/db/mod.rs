pub mod keys;
pub mod models;
pub mod repository;
pub mod store;
