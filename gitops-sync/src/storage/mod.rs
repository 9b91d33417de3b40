//! Storage: on-disk layout, settings and the record stores

pub mod layout;
pub mod models;
pub mod repos;
pub mod settings;
pub mod snapshot;
