//! Platform upgrade routines and the queue that runs them

pub mod routines;
pub mod scheduler;

pub use routines::{run_version, UpgradeContext, UpgradeVersion};
pub use scheduler::{execute, UpgradeScheduler, UpgradeTask};
