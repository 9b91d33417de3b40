//! gitops-sync Library
//!
//! Builds Kubernetes manifests from platform records, commits them into
//! per-environment git repositories and runs the versioned upgrade routines.

pub mod app;
pub mod authn;
pub mod checklog;
pub mod errors;
pub mod filesys;
pub mod git;
pub mod http;
pub mod logs;
pub mod manifest;
pub mod reconcile;
pub mod server;
pub mod storage;
pub mod upgrade;
pub mod utils;
