// Copyright 2024, The Kaspa AIO Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! # Configuration store
//!
//! Reads and writes the declarative artifacts under the project root: the
//! environment file, the compose files and the persisted installation/wizard
//! state. All reads are total (a missing file is an empty document); all
//! writes are two-phase (temp file, fsync, rename) behind a single-writer
//! lock.

mod compose_file;
mod env_file;
pub(crate) mod fs;
pub mod masking;
mod state_file;

pub use self::{
    compose_file::ComposeFile,
    env_file::{ChangeKind, ConfigChange, ConfigDiff, EnvFile},
    state_file::{InstallationState, InstalledService, PersistedTask, WizardState},
};

use crate::error::{BoundaryError, ErrorKind};
use log::*;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::Mutex;

const LOG_TARGET: &str = "aio::config_store";

pub const ENV_FILE: &str = ".env";
pub const COMPOSE_FILE: &str = "docker-compose.yml";
pub const COMPOSE_OVERRIDE_FILE: &str = "docker-compose.override.yml";
pub const STATE_DIR: &str = ".kaspa-aio";
pub const INSTALLATION_STATE_FILE: &str = "installation-state.json";
pub const WIZARD_STATE_FILE: &str = "wizard-state.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error on configuration artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unknown compose service `{0}`")]
    UnknownService(String),
    #[error("Compose service `{0}` has no image reference")]
    ServiceHasNoImage(String),
}

impl BoundaryError for ConfigError {
    fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::UnknownService(_) | ConfigError::ServiceHasNoImage(_) => ErrorKind::Validation,
            _ => ErrorKind::Internal,
        }
    }
}

/// Owner of the live declarative artifacts on disk.
#[derive(Clone)]
pub struct ConfigStore {
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl ConfigStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn env_path(&self) -> PathBuf {
        self.root.join(ENV_FILE)
    }

    pub fn compose_path(&self) -> PathBuf {
        self.root.join(COMPOSE_FILE)
    }

    pub fn compose_override_path(&self) -> PathBuf {
        self.root.join(COMPOSE_OVERRIDE_FILE)
    }

    pub fn installation_state_path(&self) -> PathBuf {
        self.root.join(STATE_DIR).join(INSTALLATION_STATE_FILE)
    }

    pub fn wizard_state_path(&self) -> PathBuf {
        self.root.join(STATE_DIR).join(WIZARD_STATE_FILE)
    }

    pub async fn read_env(&self) -> Result<EnvFile, ConfigError> {
        let contents = fs::read_string_opt(&self.env_path()).await?.unwrap_or_default();
        Ok(EnvFile::parse(&contents))
    }

    pub async fn write_env(&self, env: &EnvFile) -> Result<(), ConfigError> {
        let _guard = self.write_lock.lock().await;
        debug!(target: LOG_TARGET, "writing {}", self.env_path().display());
        fs::write_atomic(&self.env_path(), env.to_string().as_bytes()).await?;
        Ok(())
    }

    pub async fn read_compose(&self) -> Result<ComposeFile, ConfigError> {
        let contents = fs::read_string_opt(&self.compose_path()).await?.unwrap_or_default();
        ComposeFile::parse(&contents)
    }

    pub async fn write_compose(&self, compose: &ComposeFile) -> Result<(), ConfigError> {
        let _guard = self.write_lock.lock().await;
        debug!(target: LOG_TARGET, "writing {}", self.compose_path().display());
        fs::write_atomic(&self.compose_path(), compose.to_string()?.as_bytes()).await?;
        Ok(())
    }

    pub async fn read_installation_state(&self) -> Result<InstallationState, ConfigError> {
        match fs::read_string_opt(&self.installation_state_path()).await? {
            Some(contents) => Ok(serde_json::from_str(&contents)?),
            None => Ok(InstallationState::default()),
        }
    }

    pub async fn write_installation_state(&self, state: &InstallationState) -> Result<(), ConfigError> {
        let _guard = self.write_lock.lock().await;
        let bytes = serde_json::to_vec_pretty(state)?;
        fs::write_atomic(&self.installation_state_path(), &bytes).await?;
        Ok(())
    }

    pub async fn read_wizard_state(&self) -> Result<WizardState, ConfigError> {
        match fs::read_string_opt(&self.wizard_state_path()).await? {
            Some(contents) => Ok(serde_json::from_str(&contents)?),
            None => Ok(WizardState::default()),
        }
    }

    pub async fn write_wizard_state(&self, state: &WizardState) -> Result<(), ConfigError> {
        let _guard = self.write_lock.lock().await;
        let bytes = serde_json::to_vec_pretty(state)?;
        fs::write_atomic(&self.wizard_state_path(), &bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn missing_artifacts_read_as_empty_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        assert!(store.read_env().await.unwrap().is_empty());
        assert!(store.read_compose().await.unwrap().service_names().is_empty());
        assert_eq!(store.read_installation_state().await.unwrap(), InstallationState::default());
        assert_eq!(store.read_wizard_state().await.unwrap(), WizardState::default());
    }

    #[tokio::test]
    async fn env_round_trips_byte_for_byte() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        let env = EnvFile::parse("# managed by the wizard\nKASPA_NETWORK=mainnet\nKASPAD_RPC_PORT=16110\n");
        store.write_env(&env).await.unwrap();
        let back = store.read_env().await.unwrap();
        assert_eq!(back.to_string(), env.to_string());
    }

    #[tokio::test]
    async fn installation_state_persists_under_the_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        let mut state = InstallationState::default();
        state.version = "0.4.1".to_string();
        store.write_installation_state(&state).await.unwrap();
        assert!(dir.path().join(STATE_DIR).join(INSTALLATION_STATE_FILE).exists());
        assert_eq!(store.read_installation_state().await.unwrap().version, "0.4.1");
    }
}
