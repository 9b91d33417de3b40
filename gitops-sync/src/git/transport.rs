//! SSH-authenticated git transport
//!
//! Every network operation authenticates with a private key held in memory
//! (never written to disk) and accepts any host key. Environment repositories
//! live on an internal git service whose host keys are not distributed to this
//! process, so host-key verification is deliberately disabled here.

use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::Arc;

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    BranchType, CertificateCheckStatus, Cred, CredentialType, ErrorCode, FetchOptions,
    IndexAddOption, PushOptions, RemoteCallbacks, Repository,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::EngineError;
use crate::git::tree::{commit_index, head_commit, CommitAuthor, WorkingTree};

pub const MASTER: &str = "master";
pub const ORIGIN: &str = "origin";
pub const REPO_ROOT: &str = "devops-service-repo";
pub const RENDER_COMMIT_MESSAGE: &str = "Render Variables[skip ci]";
const CI_TOKEN_USER: &str = "gitlab-ci-token";
const DEFAULT_SSH_USER: &str = "git";

/// Branches holding each project template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateVersions {
    pub micro_service: String,
    pub micro_service_front: String,
    pub java_lib: String,
}

impl Default for TemplateVersions {
    fn default() -> Self {
        Self {
            micro_service: MASTER.to_string(),
            micro_service_front: MASTER.to_string(),
            java_lib: MASTER.to_string(),
        }
    }
}

impl TemplateVersions {
    /// Branch to clone for a template type, `master` for unknown types
    pub fn branch_for(&self, template_type: &str) -> &str {
        match template_type {
            "MicroService" => &self.micro_service,
            "MicroServiceFront" => &self.micro_service_front,
            "JavaLib" => &self.java_lib,
            _ => MASTER,
        }
    }
}

/// Git transport bound to one SSH identity
#[derive(Clone)]
pub struct GitTransport {
    workspace_root: PathBuf,
    ssh_key: Option<Arc<SecretString>>,
    author: CommitAuthor,
    templates: TemplateVersions,
}

impl std::fmt::Debug for GitTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitTransport")
            .field("workspace_root", &self.workspace_root)
            .field("ssh_key", &self.ssh_key.as_ref().map(|_| "<redacted>"))
            .field("author", &self.author)
            .finish()
    }
}

impl GitTransport {
    /// Create a transport without an SSH identity (local and template work only)
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            ssh_key: None,
            author: CommitAuthor::default(),
            templates: TemplateVersions::default(),
        }
    }

    /// Bind a private key, given as the raw key text
    pub fn with_ssh_key(mut self, private_key: impl Into<String>) -> Self {
        self.ssh_key = Some(Arc::new(SecretString::from(private_key.into())));
        self
    }

    pub fn with_author(mut self, author: CommitAuthor) -> Self {
        self.author = author;
        self
    }

    pub fn with_templates(mut self, templates: TemplateVersions) -> Self {
        self.templates = templates;
        self
    }

    /// Local directory for a named checkout under the workspace root
    pub fn working_directory(&self, name: &str) -> PathBuf {
        let joined = format!(
            "{}/{}/{}",
            self.workspace_root.to_string_lossy().trim_end_matches(['/', '\\']),
            REPO_ROOT,
            name
        );
        PathBuf::from(joined.replace('/', &MAIN_SEPARATOR.to_string()))
    }

    /// Remove a named checkout and everything under it
    pub async fn delete_working_directory(&self, name: &str) -> Result<(), EngineError> {
        let path = self.working_directory(name);
        if tokio::fs::metadata(&path).await.is_ok() {
            tokio::fs::remove_dir_all(&path).await?;
        }
        Ok(())
    }

    fn ssh_callbacks(&self) -> RemoteCallbacks<'static> {
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(ssh_credentials(self.ssh_key.clone()));
        callbacks.certificate_check(|_cert, host| {
            debug!("Accepting host key for {}", host);
            Ok(CertificateCheckStatus::CertificateOk)
        });
        callbacks.push_update_reference(reject_on_push_failure);
        callbacks
    }

    fn ssh_fetch_options(&self) -> FetchOptions<'static> {
        let mut options = FetchOptions::new();
        options.remote_callbacks(self.ssh_callbacks());
        options
    }

    fn ssh_push_options(&self) -> PushOptions<'static> {
        let mut options = PushOptions::new();
        options.remote_callbacks(self.ssh_callbacks());
        options
    }

    /// Clone `master` of `remote_url` into `target_path`
    pub async fn clone_by_ssh(&self, target_path: &Path, remote_url: &str) -> Result<WorkingTree, EngineError> {
        info!("Cloning {} into {}", remote_url, target_path.display());
        let transport = self.clone();
        let target = target_path.to_path_buf();
        let url = remote_url.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), EngineError> {
            transport
                .clone_blocking(&url, &target)
                .map_err(|e| EngineError::TransportError(format!("clone {} failed: {}", url, e.message())))
        })
        .await??;
        Ok(WorkingTree::new(target_path))
    }

    /// Clone the remote default branch, then settle HEAD on `master`.
    ///
    /// A freshly created project has no branches at all; its checkout is left
    /// with an unborn `master` that the first commit creates.
    fn clone_blocking(&self, url: &str, target: &Path) -> Result<(), git2::Error> {
        let repo = RepoBuilder::new()
            .fetch_options(self.ssh_fetch_options())
            .clone(url, target)?;

        let local_master = format!("refs/heads/{}", MASTER);
        let on_master = match repo.head() {
            Ok(head) => head.name() == Some(local_master.as_str()),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => false,
            Err(e) => return Err(e),
        };
        if on_master {
            return Ok(());
        }

        match repo.find_reference(&format!("refs/remotes/{}/{}", ORIGIN, MASTER)) {
            Ok(remote_master) => {
                let commit = remote_master.peel_to_commit()?;
                let mut branch = repo.branch(MASTER, &commit, true)?;
                branch.set_upstream(Some(&format!("{}/{}", ORIGIN, MASTER)))?;
                repo.set_head(&local_master)?;
                repo.checkout_head(Some(CheckoutBuilder::default().force()))?;
            }
            Err(e) if e.code() == ErrorCode::NotFound => {
                debug!("{} has no {} yet", url, MASTER);
                repo.set_head(&local_master)?;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Pull `master` into the repository at `path`.
    ///
    /// Never fails: any error is logged and the pull becomes a no-op, leaving
    /// the local tree as it was.
    pub async fn pull_by_ssh(&self, path: &Path) {
        let transport = self.clone();
        let target = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || transport.pull_blocking(&target)).await;
        match result {
            Ok(Ok(())) => debug!("Pulled {}", path.display()),
            Ok(Err(e)) => warn!("Pull of {} failed, keeping local state: {}", path.display(), e),
            Err(e) => warn!("Pull of {} aborted: {}", path.display(), e),
        }
    }

    fn pull_blocking(&self, path: &Path) -> Result<(), EngineError> {
        let repo = Repository::open(path)?;
        let mut remote = repo.find_remote(ORIGIN)?;
        remote.fetch(&[MASTER], Some(&mut self.ssh_fetch_options()), None)?;

        let fetch_head = repo.find_reference("FETCH_HEAD")?;
        let incoming = repo.reference_to_annotated_commit(&fetch_head)?;
        let (analysis, _) = repo.merge_analysis(&[&incoming])?;

        if analysis.is_up_to_date() {
            return Ok(());
        }

        let refname = format!("refs/heads/{}", MASTER);
        if analysis.is_fast_forward() || analysis.is_unborn() {
            repo.reference(&refname, incoming.id(), true, "pull: fast-forward")?;
            repo.set_head(&refname)?;
            repo.checkout_head(Some(CheckoutBuilder::default().force()))?;
            return Ok(());
        }

        repo.merge(&[&incoming], None, None)?;
        let mut index = repo.index()?;
        if index.has_conflicts() {
            repo.cleanup_state()?;
            repo.checkout_head(Some(CheckoutBuilder::default().force()))?;
            return Err(EngineError::GitError(format!(
                "pull of {} has conflicts",
                path.display()
            )));
        }

        let sig = git2::Signature::now(&self.author.name, &self.author.email)?;
        let tree = repo.find_tree(index.write_tree()?)?;
        let local = head_commit(&repo)?
            .ok_or_else(|| EngineError::GitError("cannot merge into an unborn branch".to_string()))?;
        let remote_commit = repo.find_commit(incoming.id())?;
        repo.commit(
            Some("HEAD"),
            &sig,
            &sig,
            &format!("Merge branch '{}' of origin", MASTER),
            &tree,
            &[&local, &remote_commit],
        )?;
        repo.cleanup_state()?;
        Ok(())
    }

    /// Wipe the named working directory and clone the branch for a template type
    pub async fn clone_template(
        &self,
        name: &str,
        template_type: &str,
        remote_url: &str,
    ) -> Result<WorkingTree, EngineError> {
        self.delete_working_directory(name).await?;
        let target = self.working_directory(name);
        let branch = self.templates.branch_for(template_type).to_string();
        let url = remote_url.to_string();
        let dest = target.clone();
        info!("Cloning template {} ({}) into {}", url, branch, dest.display());
        tokio::task::spawn_blocking(move || -> Result<(), EngineError> {
            RepoBuilder::new()
                .branch(&branch)
                .clone(&url, &dest)
                .map_err(|e| EngineError::TransportError(format!("error.git.clone: {}", e.message())))?;
            Ok(())
        })
        .await??;
        Ok(WorkingTree::new(target))
    }

    /// Commit everything in `tree` and push all local branches to `repo_url`.
    ///
    /// The token is embedded into the push URL as `gitlab-ci-token:<token>@`.
    /// The working directory `name` is removed whether the push succeeds or not.
    pub async fn push(
        &self,
        tree: WorkingTree,
        name: &str,
        repo_url: &str,
        username: &str,
        access_token: &SecretString,
        is_template_seed: bool,
    ) -> Result<(), EngineError> {
        let guard = WorkingDirGuard(self.working_directory(name));
        let push_url = embed_token(repo_url, access_token.expose_secret())?;
        let username = username.to_string();
        let token = access_token.expose_secret().to_string();
        let author = self.author.clone();

        tokio::task::spawn_blocking(move || -> Result<(), EngineError> {
            let _guard = guard;
            let repo = Repository::open(tree.path())?;

            let mut index = repo.index()?;
            index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
            index.update_all(["*"].iter(), None)?;
            index.write()?;
            let commit_id = commit_index(&repo, &author, RENDER_COMMIT_MESSAGE)?;

            if is_template_seed && repo.find_branch(MASTER, BranchType::Local).is_err() {
                let commit = repo.find_commit(commit_id)?;
                repo.branch(MASTER, &commit, false)?;
            }

            let mut refspecs = Vec::new();
            for branch in repo.branches(Some(BranchType::Local))? {
                let (branch, _) = branch?;
                if let Some(name) = branch.name()? {
                    refspecs.push(format!("refs/heads/{0}:refs/heads/{0}", name));
                }
            }

            let mut callbacks = RemoteCallbacks::new();
            callbacks.credentials(move |_url, _user, _allowed| Cred::userpass_plaintext(&username, &token));
            callbacks.push_update_reference(reject_on_push_failure);
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);

            let mut remote = repo.remote_anonymous(&push_url)?;
            remote
                .push(&refspecs, Some(&mut options))
                .map_err(|e| EngineError::TransportError(format!("error.git.push: {}", e.message())))?;
            info!("Pushed {} branch(es) to {}", refspecs.len(), redact_url(&push_url));
            Ok(())
        })
        .await?
    }

    /// Push the current branch to `origin`
    pub async fn git_push(&self, tree: &WorkingTree) -> Result<(), EngineError> {
        let transport = self.clone();
        let path = tree.path().to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<(), EngineError> {
            let repo = Repository::open(&path)?;
            let head = repo.head()?;
            let branch = head
                .shorthand()
                .ok_or_else(|| EngineError::GitError("HEAD is not a branch".to_string()))?
                .to_string();
            let mut remote = repo.find_remote(ORIGIN)?;
            let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch);
            remote.push(&[refspec], Some(&mut transport.ssh_push_options()))?;
            Ok(())
        })
        .await?
    }

    /// Push every local tag to `origin`
    pub async fn git_push_tag(&self, tree: &WorkingTree) -> Result<(), EngineError> {
        let transport = self.clone();
        let path = tree.path().to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<(), EngineError> {
            let repo = Repository::open(&path)?;
            let refspecs: Vec<String> = repo
                .tag_names(None)?
                .iter()
                .flatten()
                .map(|tag| format!("refs/tags/{0}:refs/tags/{0}", tag))
                .collect();
            if refspecs.is_empty() {
                return Ok(());
            }
            let mut remote = repo.find_remote(ORIGIN)?;
            remote.push(&refspecs, Some(&mut transport.ssh_push_options()))?;
            Ok(())
        })
        .await?
    }

    /// Write `content` to `relative_path` inside `tree`, then stage and commit it
    pub async fn create_file_in_repo(
        &self,
        tree: &WorkingTree,
        relative_path: &str,
        content: &str,
        commit_message: Option<&str>,
    ) -> Result<(), EngineError> {
        let target = tree.path().join(relative_path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, content).await?;

        let path = tree.path().to_path_buf();
        let relative = relative_path.to_string();
        let message = commit_message
            .map(str::to_string)
            .unwrap_or_else(|| format!("[ADD] {}", relative_path));
        let author = self.author.clone();
        let committed = tokio::task::spawn_blocking(move || -> Result<(), EngineError> {
            let repo = Repository::open(&path)?;
            let mut index = repo.index()?;
            index.add_path(Path::new(&relative))?;
            index.write()?;
            if let Err(e) = commit_index(&repo, &author, &message) {
                // unstage so the next attempt starts from a clean index
                let _ = index.remove_path(Path::new(&relative)).and_then(|_| index.write());
                return Err(e.into());
            }
            Ok(())
        })
        .await
        .map_err(EngineError::from)
        .and_then(|result| result);

        // an uncommitted file would otherwise be skipped as existing on every later run
        if committed.is_err() {
            if let Err(e) = tokio::fs::remove_file(&target).await {
                warn!("Failed to remove uncommitted {}: {}", target.display(), e);
            }
        }
        committed
    }
}

/// SSH key credentials offered at most once per operation.
///
/// libgit2 keeps asking for credentials for as long as the server rejects
/// them, so a second request means the key was refused.
fn ssh_credentials(
    key: Option<Arc<SecretString>>,
) -> impl FnMut(&str, Option<&str>, CredentialType) -> Result<Cred, git2::Error> + Send + 'static {
    let mut attempts = 0usize;
    move |_url, username_from_url, allowed| {
        attempts += 1;
        if attempts > 1 {
            return Err(git2::Error::from_str("SSH authentication failed"));
        }
        let Some(key) = key.as_ref() else {
            return Err(git2::Error::from_str("no SSH identity configured"));
        };
        if !allowed.is_ssh_key() {
            return Err(git2::Error::from_str("remote does not accept SSH keys"));
        }
        let user = username_from_url.unwrap_or(DEFAULT_SSH_USER);
        Cred::ssh_key_from_memory(user, None, key.expose_secret(), None)
    }
}

fn reject_on_push_failure(refname: &str, status: Option<&str>) -> Result<(), git2::Error> {
    match status {
        Some(reason) => Err(git2::Error::from_str(&format!(
            "remote rejected {}: {}",
            refname, reason
        ))),
        None => Ok(()),
    }
}

/// Insert `gitlab-ci-token:<token>@` into an http(s) remote URL
pub fn embed_token(remote_url: &str, token: &str) -> Result<String, EngineError> {
    let mut url = Url::parse(remote_url)
        .map_err(|e| EngineError::ConfigError(format!("invalid remote url {}: {}", remote_url, e)))?;
    url.set_username(CI_TOKEN_USER)
        .and_then(|_| url.set_password(Some(token)))
        .map_err(|_| EngineError::ConfigError(format!("remote url {} cannot carry credentials", remote_url)))?;
    Ok(url.to_string())
}

fn redact_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            let _ = parsed.set_password(None);
            parsed.to_string()
        }
        Err(_) => "<remote>".to_string(),
    }
}

/// Removes a working directory when dropped
struct WorkingDirGuard(PathBuf);

impl Drop for WorkingDirGuard {
    fn drop(&mut self) {
        if self.0.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.0) {
                warn!("Failed to delete working directory {}: {}", self.0.display(), e);
            }
        }
    }
}
