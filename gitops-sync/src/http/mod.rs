//! HTTP clients for remote collaborators

pub mod client;
pub mod gitlab;
pub mod saga;
