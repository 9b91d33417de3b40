//! Tag and push a reconciled working tree

use tracing::{debug, info};

use crate::errors::EngineError;
use crate::git::tags::AGENT_SYNC_TAG;
use crate::git::transport::GitTransport;
use crate::git::tree::WorkingTree;

/// Mark HEAD with the sync tag unless the tag already exists, then push the
/// current branch followed by all tags.
///
/// Returns whether a tag was created.
pub async fn tag_and_push(transport: &GitTransport, tree: &WorkingTree) -> Result<bool, EngineError> {
    if !tree.has_commits().await? {
        debug!("{} has nothing committed, nothing to push", tree.path().display());
        return Ok(false);
    }

    let created = if tree.has_tag(AGENT_SYNC_TAG).await? {
        debug!("{} already tagged {}", tree.path().display(), AGENT_SYNC_TAG);
        false
    } else {
        tree.create_tag(AGENT_SYNC_TAG).await?;
        info!("Tagged {} with {}", tree.path().display(), AGENT_SYNC_TAG);
        true
    };

    transport.git_push(tree).await?;
    transport.git_push_tag(tree).await?;
    Ok(created)
}
