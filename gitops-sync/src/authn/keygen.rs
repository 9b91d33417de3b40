//! SSH keypair generation

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::EngineError;
use crate::filesys::dir::Dir;

const KEY_FILE: &str = "id_rsa";

/// RSA keypair in OpenSSH text form
pub struct SshKeyPair {
    pub private_key: SecretString,
    pub public_key: String,
}

impl std::fmt::Debug for SshKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshKeyPair")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .finish()
    }
}

/// Key generator trait for testability
#[async_trait]
pub trait SshKeyGenerator: Send + Sync {
    /// Generate a keypair whose public half carries `comment`
    async fn generate(&self, comment: &str) -> Result<SshKeyPair, EngineError>;
}

/// Generates keys with the system `ssh-keygen` binary in a scratch directory
#[derive(Debug, Clone)]
pub struct SshKeygenCommand {
    program: String,
    bits: u32,
}

impl Default for SshKeygenCommand {
    fn default() -> Self {
        Self {
            program: "ssh-keygen".to_string(),
            bits: 2048,
        }
    }
}

#[async_trait]
impl SshKeyGenerator for SshKeygenCommand {
    async fn generate(&self, comment: &str) -> Result<SshKeyPair, EngineError> {
        let scratch = Dir::create_temp_dir("gitops-sync-keygen").await?;
        let result = self.generate_in(&scratch, comment).await;
        if let Err(e) = scratch.delete().await {
            debug!("Failed to remove {}: {}", scratch.path().display(), e);
        }
        result
    }
}

impl SshKeygenCommand {
    async fn generate_in(&self, scratch: &Dir, comment: &str) -> Result<SshKeyPair, EngineError> {
        let key_file = scratch.file(KEY_FILE);
        let output = Command::new(&self.program)
            .args(["-q", "-t", "rsa", "-m", "PEM", "-N", ""])
            .arg("-b")
            .arg(self.bits.to_string())
            .arg("-C")
            .arg(comment)
            .arg("-f")
            .arg(key_file.path())
            .output()
            .await
            .map_err(|e| EngineError::Internal(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(EngineError::Internal(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let private_key = key_file.read_string().await?;
        let public_key = scratch.file(&format!("{}.pub", KEY_FILE)).read_string().await?;
        info!("Generated SSH keypair for {}", comment);
        Ok(SshKeyPair {
            private_key: SecretString::from(private_key),
            public_key: public_key.trim().to_string(),
        })
    }
}
