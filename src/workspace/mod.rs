//! Workspace Coordinator and its two external collaborators, GitClient and
//! CredentialVault (spec.md §4.7, §6).

mod in_memory;

pub use in_memory::{InMemoryCredentialVault, InMemoryGitClient};

use crate::error::CoreError;
use crate::model::PullRequestRef;
use async_trait::async_trait;
use std::sync::Arc;

/// One repository a task operates over.
#[derive(Debug, Clone)]
pub struct RepoSpec {
    pub name: String,
    pub clone_url: String,
}

/// The narrow git primitive interface (spec.md §6). Implementations are
/// out of scope; this is the seam.
#[async_trait]
pub trait GitClient: Send + Sync {
    async fn clone_repository(&self, clone_url: &str, dest: &str) -> Result<(), CoreError>;
    async fn has_changes(&self, path: &str) -> Result<bool, CoreError>;
    async fn changed_files(&self, path: &str) -> Result<Vec<String>, CoreError>;
    async fn discard_changes(&self, path: &str) -> Result<(), CoreError>;
    async fn stage_all(&self, path: &str) -> Result<(), CoreError>;
    async fn commit(&self, path: &str, message: &str) -> Result<String, CoreError>;
    /// Whether `path` has local commits not yet on the remote branch — the
    /// condition Merge checks (spec.md §4.6: "one PR per repository that
    /// has commits on the branch"), distinct from `has_changes`'s working-
    /// tree dirtiness which a successful commit already clears.
    async fn has_unpushed_commits(&self, path: &str) -> Result<bool, CoreError>;
    async fn push(&self, path: &str, credential: &str, branch: &str) -> Result<(), CoreError>;
    async fn open_pull_request(
        &self,
        repository: &str,
        branch: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequestRef, CoreError>;
}

/// `getCredential`, `encrypt`, `decrypt` (spec.md §6). The core never logs
/// or publishes plaintext credentials returned from this trait.
#[async_trait]
pub trait CredentialVault: Send + Sync {
    async fn get_credential(&self, user_id: &str) -> Result<String, CoreError>;
    async fn encrypt(&self, plaintext: &str) -> Result<String, CoreError>;
    async fn decrypt(&self, cipher: &str) -> Result<String, CoreError>;
}

/// Implements spec.md §4.7's operations on top of a `GitClient` and
/// `CredentialVault`.
pub struct WorkspaceCoordinator<G: GitClient, V: CredentialVault> {
    git: Arc<G>,
    vault: Arc<V>,
    base_dir: String,
}

impl<G: GitClient, V: CredentialVault> WorkspaceCoordinator<G, V> {
    pub fn new(git: Arc<G>, vault: Arc<V>, base_dir: impl Into<String>) -> Self {
        Self { git, vault, base_dir: base_dir.into() }
    }

    fn repo_path(&self, task_id: &str, repo_name: &str) -> String {
        format!("{}/{}/{}", self.base_dir, task_id, repo_name)
    }

    /// Public accessor for phases that need the on-disk path for a scan
    /// (e.g. the Developer phase's OBSERVE step, Global Scan).
    pub fn workspace_path(&self, task_id: &str, repo_name: &str) -> String {
        self.repo_path(task_id, repo_name)
    }

    /// Clones each repository into `<base>/<taskId>/<repoName>` (idempotent
    /// if already present) and writes an environment file populated from
    /// decrypted credential values.
    pub async fn prepare_workspace(
        &self,
        task_id: &str,
        repos: &[RepoSpec],
        owner_user_id: &str,
        env: &[(String, String)],
    ) -> Result<Vec<String>, CoreError> {
        let credential = self.vault.get_credential(owner_user_id).await?;
        let mut paths = Vec::new();
        for repo in repos {
            let path = self.repo_path(task_id, &repo.name);
            if !path_exists(&path) {
                self.git.clone_repository(&repo.clone_url, &path).await?;
            }
            self.write_env_file(&path, &credential, env).await?;
            paths.push(path);
        }
        Ok(paths)
    }

    async fn write_env_file(
        &self,
        path: &str,
        credential: &str,
        env: &[(String, String)],
    ) -> Result<(), CoreError> {
        let mut lines = Vec::new();
        for (key, cipher) in env {
            let plaintext = self.vault.decrypt(cipher).await?;
            lines.push(format!("{}={}", key, plaintext));
        }
        lines.push(format!("REPO_ACCESS_TOKEN={}", credential));
        let contents = lines.join("\n");
        let env_path = format!("{}/.env", path);
        tokio::fs::write(&env_path, contents)
            .await
            .map_err(|e| CoreError::Transient(format!("writing env file {}: {}", env_path, e)))
    }

    pub async fn has_changes(&self, task_id: &str, repo_name: &str) -> Result<bool, CoreError> {
        self.git.has_changes(&self.repo_path(task_id, repo_name)).await
    }

    pub async fn changed_files(&self, task_id: &str, repo_name: &str) -> Result<Vec<String>, CoreError> {
        self.git.changed_files(&self.repo_path(task_id, repo_name)).await
    }

    /// Discard changes and verify the rollback invariant (spec.md §8
    /// invariant 3: after a non-approved story, `hasChanges` is false).
    pub async fn discard_changes(&self, task_id: &str, repo_name: &str) -> Result<(), CoreError> {
        let path = self.repo_path(task_id, repo_name);
        self.git.discard_changes(&path).await?;
        if self.git.has_changes(&path).await? {
            return Err(CoreError::Fatal(format!(
                "rollback invariant violated: {} still has changes after discard",
                path
            )));
        }
        Ok(())
    }

    pub async fn stage_all(&self, task_id: &str, repo_name: &str) -> Result<(), CoreError> {
        self.git.stage_all(&self.repo_path(task_id, repo_name)).await
    }

    pub async fn commit(&self, task_id: &str, repo_name: &str, message: &str) -> Result<String, CoreError> {
        self.git.commit(&self.repo_path(task_id, repo_name), message).await
    }

    pub async fn has_unpushed_commits(&self, task_id: &str, repo_name: &str) -> Result<bool, CoreError> {
        self.git.has_unpushed_commits(&self.repo_path(task_id, repo_name)).await
    }

    pub async fn push(
        &self,
        task_id: &str,
        repo_name: &str,
        owner_user_id: &str,
        branch: &str,
    ) -> Result<(), CoreError> {
        let credential = self.vault.get_credential(owner_user_id).await?;
        self.git.push(&self.repo_path(task_id, repo_name), &credential, branch).await
    }

    pub async fn open_pull_request(
        &self,
        repository: &str,
        branch: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequestRef, CoreError> {
        self.git.open_pull_request(repository, branch, title, body).await
    }
}

fn path_exists(path: &str) -> bool {
    std::path::Path::new(path).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn prepare_workspace_is_idempotent_and_writes_env_file() {
        let base = tempfile::tempdir().unwrap();
        let git = Arc::new(InMemoryGitClient::new());
        let mut creds = HashMap::new();
        creds.insert("user-1".to_string(), "bearer-token".to_string());
        let vault = Arc::new(InMemoryCredentialVault::new(creds));
        let coordinator = WorkspaceCoordinator::new(git, vault.clone(), base.path().to_string_lossy().to_string());

        let repos = vec![RepoSpec { name: "svc".to_string(), clone_url: "https://example.invalid/svc.git".to_string() }];
        let cipher = vault.encrypt("db-password").await.unwrap();

        let paths = coordinator
            .prepare_workspace("task-1", &repos, "user-1", &[("DB_PASSWORD".to_string(), cipher.clone())])
            .await
            .unwrap();
        assert_eq!(paths.len(), 1);

        let env_contents = tokio::fs::read_to_string(format!("{}/.env", paths[0])).await.unwrap();
        assert!(env_contents.contains("DB_PASSWORD=db-password"));
        assert!(env_contents.contains("REPO_ACCESS_TOKEN=bearer-token"));

        // A second call with the same taskId/repo must not fail (idempotent).
        coordinator
            .prepare_workspace("task-1", &repos, "user-1", &[("DB_PASSWORD".to_string(), cipher)])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn discard_changes_satisfies_rollback_invariant() {
        let base = tempfile::tempdir().unwrap();
        let git = Arc::new(InMemoryGitClient::new());
        let vault = Arc::new(InMemoryCredentialVault::new(HashMap::new()));
        let coordinator = WorkspaceCoordinator::new(git.clone(), vault, base.path().to_string_lossy().to_string());

        let repos = vec![RepoSpec { name: "svc".to_string(), clone_url: "https://example.invalid/svc.git".to_string() }];
        coordinator.prepare_workspace("task-2", &repos, "anon", &[]).await.unwrap_err();

        let path = format!("{}/task-2/svc", base.path().to_string_lossy());
        git.clone_repository("https://example.invalid/svc.git", &path).await.unwrap();
        git.mark_dirty(&path, vec!["main.rs".to_string()]).await;
        assert!(coordinator.has_changes("task-2", "svc").await.unwrap());

        coordinator.discard_changes("task-2", "svc").await.unwrap();
        assert!(!coordinator.has_changes("task-2", "svc").await.unwrap());
    }
}
