//! Environment reconciliation: stored records to manifests in git

pub mod builders;
pub mod ingress;
pub mod locator;
pub mod materializer;
pub mod publish;

pub use materializer::{EnvironmentReport, Materializer};
