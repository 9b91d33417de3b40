//! Server state

use crate::upgrade::UpgradeScheduler;

/// Server state shared across handlers
pub struct ServerState {
    pub scheduler: UpgradeScheduler,
}

impl ServerState {
    pub fn new(scheduler: UpgradeScheduler) -> Self {
        Self { scheduler }
    }
}
