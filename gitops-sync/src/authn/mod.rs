//! Credentials for environment repositories

pub mod keygen;
