//! Local working tree handle

use std::path::{Path, PathBuf};

use git2::{Commit, ErrorCode, Oid, Repository, Signature};
use tokio::fs;

use crate::errors::EngineError;

/// Identity used for commits made by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

impl Default for CommitAuthor {
    fn default() -> Self {
        Self {
            name: "gitops-sync".to_string(),
            email: "gitops-sync@localhost".to_string(),
        }
    }
}

/// A cloned repository on local disk.
///
/// The repository is reopened for every operation so no libgit2 handle
/// outlives the call that needed it.
#[derive(Debug, Clone)]
pub struct WorkingTree {
    path: PathBuf,
}

impl WorkingTree {
    /// Reference a working tree without touching disk
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Open an existing repository, failing if `path` is not one
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let tree = Self::new(path);
        let path = tree.path.clone();
        tokio::task::spawn_blocking(move || Repository::open(&path).map(|_| ()))
            .await??;
        Ok(tree)
    }

    /// Get the working tree root
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check whether a file exists relative to the tree root
    pub async fn file_exists(&self, relative_path: &str) -> bool {
        fs::metadata(self.path.join(relative_path)).await.is_ok()
    }

    /// Whether HEAD points at a commit yet
    pub async fn has_commits(&self) -> Result<bool, EngineError> {
        let path = self.path.clone();
        let born = tokio::task::spawn_blocking(move || -> Result<bool, git2::Error> {
            let repo = Repository::open(&path)?;
            let born = head_commit(&repo)?.is_some();
            Ok(born)
        })
        .await??;
        Ok(born)
    }

    /// Short names of every tag in the repository
    pub async fn tag_names(&self) -> Result<Vec<String>, EngineError> {
        let path = self.path.clone();
        let names = tokio::task::spawn_blocking(move || -> Result<Vec<String>, git2::Error> {
            let repo = Repository::open(&path)?;
            let tags = repo.tag_names(None)?;
            Ok(tags.iter().flatten().map(str::to_string).collect())
        })
        .await??;
        Ok(names)
    }

    /// Exact, case-sensitive tag lookup
    pub async fn has_tag(&self, name: &str) -> Result<bool, EngineError> {
        Ok(self.tag_names().await?.iter().any(|tag| tag == name))
    }

    /// Create a lightweight tag on HEAD
    pub async fn create_tag(&self, name: &str) -> Result<(), EngineError> {
        let path = self.path.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), git2::Error> {
            let repo = Repository::open(&path)?;
            let head = repo.head()?.peel_to_commit()?;
            repo.tag_lightweight(&name, head.as_object(), false)?;
            Ok(())
        })
        .await??;
        Ok(())
    }
}

/// Resolve the commit HEAD points at, `None` for an unborn branch
pub(crate) fn head_commit(repo: &Repository) -> Result<Option<Commit<'_>>, git2::Error> {
    match repo.head() {
        Ok(head) => Ok(Some(head.peel_to_commit()?)),
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Commit the current index on top of HEAD
pub(crate) fn commit_index(
    repo: &Repository,
    author: &CommitAuthor,
    message: &str,
) -> Result<Oid, git2::Error> {
    let sig = Signature::now(&author.name, &author.email)?;
    let mut index = repo.index()?;
    let tree_oid = index.write_tree()?;
    let tree = repo.find_tree(tree_oid)?;

    let parent = head_commit(repo)?;
    let parents: Vec<&Commit<'_>> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
}
