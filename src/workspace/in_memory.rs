//! Reference `GitClient`/`CredentialVault` implementations: in-memory
//! bookkeeping rather than shelling out to `git`, for the crate's own test
//! suite. A real implementation (actual git plus a secrets backend) is an
//! external collaborator per spec.md §1/§6.

use super::{CredentialVault, GitClient};
use crate::error::CoreError;
use crate::model::PullRequestRef;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

#[derive(Default, Clone)]
struct RepoState {
    dirty: bool,
    changed_files: Vec<String>,
    commits: Vec<String>,
    pushed_commits: usize,
}

#[derive(Default)]
pub struct InMemoryGitClient {
    repos: Mutex<HashMap<String, RepoState>>,
    next_pr_number: Mutex<u64>,
}

impl InMemoryGitClient {
    pub fn new() -> Self {
        Self { repos: Mutex::new(HashMap::new()), next_pr_number: Mutex::new(1) }
    }

    /// Test hook: mark `path` as having uncommitted changes, simulating
    /// what a code agent's edits would produce.
    pub async fn mark_dirty(&self, path: &str, files: Vec<String>) {
        let mut repos = self.repos.lock().await;
        let state = repos.entry(path.to_string()).or_default();
        state.dirty = true;
        state.changed_files = files;
    }
}

#[async_trait]
impl GitClient for InMemoryGitClient {
    async fn clone_repository(&self, _clone_url: &str, dest: &str) -> Result<(), CoreError> {
        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|e| CoreError::Transient(format!("cloning into {}: {}", dest, e)))?;
        self.repos.lock().await.entry(dest.to_string()).or_default();
        Ok(())
    }

    async fn has_changes(&self, path: &str) -> Result<bool, CoreError> {
        Ok(self.repos.lock().await.get(path).map(|s| s.dirty).unwrap_or(false))
    }

    async fn changed_files(&self, path: &str) -> Result<Vec<String>, CoreError> {
        Ok(self.repos.lock().await.get(path).map(|s| s.changed_files.clone()).unwrap_or_default())
    }

    async fn discard_changes(&self, path: &str) -> Result<(), CoreError> {
        let mut repos = self.repos.lock().await;
        let state = repos.entry(path.to_string()).or_default();
        state.dirty = false;
        state.changed_files.clear();
        Ok(())
    }

    async fn stage_all(&self, path: &str) -> Result<(), CoreError> {
        if !self.repos.lock().await.contains_key(path) {
            return Err(CoreError::NotFound(format!("repo {}", path)));
        }
        Ok(())
    }

    async fn commit(&self, path: &str, message: &str) -> Result<String, CoreError> {
        let mut repos = self.repos.lock().await;
        let state = repos
            .get_mut(path)
            .ok_or_else(|| CoreError::NotFound(format!("repo {}", path)))?;
        let hash = format!("{:x}", md5_stub(message, state.commits.len()));
        state.commits.push(hash.clone());
        state.dirty = false;
        state.changed_files.clear();
        Ok(hash)
    }

    async fn has_unpushed_commits(&self, path: &str) -> Result<bool, CoreError> {
        Ok(self.repos.lock().await.get(path).map(|s| s.commits.len() > s.pushed_commits).unwrap_or(false))
    }

    async fn push(&self, path: &str, _credential: &str, _branch: &str) -> Result<(), CoreError> {
        let mut repos = self.repos.lock().await;
        let state = repos.get_mut(path).ok_or_else(|| CoreError::NotFound(format!("repo {}", path)))?;
        state.pushed_commits = state.commits.len();
        Ok(())
    }

    async fn open_pull_request(
        &self,
        repository: &str,
        branch: &str,
        title: &str,
        _body: &str,
    ) -> Result<PullRequestRef, CoreError> {
        let mut counter = self.next_pr_number.lock().await;
        let number = *counter;
        *counter += 1;
        Ok(PullRequestRef {
            repository: repository.to_string(),
            number,
            url: format!("https://example.invalid/{}/pull/{}?branch={}&title={}", repository, number, branch, title),
        })
    }
}

/// Cheap, deterministic stand-in for a real commit hash; not a real
/// cryptographic digest.
fn md5_stub(message: &str, seed: usize) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    message.hash(&mut hasher);
    seed.hash(&mut hasher);
    hasher.finish()
}

/// Reference credential vault: an in-memory map of userId to bearer token,
/// with a symmetric XOR "cipher" standing in for real encryption. Adequate
/// for the crate's own tests; never use in production.
pub struct InMemoryCredentialVault {
    credentials: HashMap<String, String>,
    known_ciphers: Mutex<HashSet<String>>,
}

impl InMemoryCredentialVault {
    pub fn new(credentials: HashMap<String, String>) -> Self {
        Self { credentials, known_ciphers: Mutex::new(HashSet::new()) }
    }
}

#[async_trait]
impl CredentialVault for InMemoryCredentialVault {
    async fn get_credential(&self, user_id: &str) -> Result<String, CoreError> {
        self.credentials
            .get(user_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("credential for user {}", user_id)))
    }

    async fn encrypt(&self, plaintext: &str) -> Result<String, CoreError> {
        let cipher = plaintext.chars().rev().collect::<String>();
        let encoded = format!("enc:{}", cipher);
        self.known_ciphers.lock().await.insert(encoded.clone());
        Ok(encoded)
    }

    async fn decrypt(&self, cipher: &str) -> Result<String, CoreError> {
        let reversed = cipher
            .strip_prefix("enc:")
            .ok_or_else(|| CoreError::Validation("not a value produced by this vault".to_string()))?;
        Ok(reversed.chars().rev().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn encrypt_then_decrypt_round_trips() {
        let vault = InMemoryCredentialVault::new(HashMap::new());
        let cipher = vault.encrypt("super-secret").await.unwrap();
        assert_ne!(cipher, "super-secret");
        let plaintext = vault.decrypt(&cipher).await.unwrap();
        assert_eq!(plaintext, "super-secret");
    }

    #[tokio::test]
    async fn discard_changes_clears_dirty_state() {
        let git = InMemoryGitClient::new();
        git.clone_repository("https://example.invalid/r.git", "/tmp/r").await.unwrap();
        git.mark_dirty("/tmp/r", vec!["a.rs".to_string()]).await;
        assert!(git.has_changes("/tmp/r").await.unwrap());

        git.discard_changes("/tmp/r").await.unwrap();
        assert!(!git.has_changes("/tmp/r").await.unwrap());
        assert!(git.changed_files("/tmp/r").await.unwrap().is_empty());
    }
}
