//! Online-network checkpoints
//!
//! A checkpoint holds the online network's parameters plus enough metadata to
//! reject a blob written for a different architecture. Target parameters are
//! never stored; they are rebuilt from the online ones after loading.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use robo_rl_core::{RLError, Result};

use crate::network::{Activation, NetworkParams, QNetwork};

/// Blob format version
pub const CHECKPOINT_VERSION: u32 = 1;

/// Serialized form of a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointBlob {
    /// Format version
    pub version: u32,
    /// Layer widths from input to output
    pub layer_sizes: Vec<usize>,
    /// Hidden-layer activation the parameters were trained with
    pub activation: Activation,
    /// Online network parameters
    pub parameters: NetworkParams,
    /// When the blob was written
    pub saved_at: DateTime<Utc>,
}

impl CheckpointBlob {
    /// Snapshot a network
    #[must_use]
    pub fn capture(network: &QNetwork) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            layer_sizes: network.params().layer_sizes(),
            activation: network.activation(),
            parameters: network.params().clone(),
            saved_at: Utc::now(),
        }
    }

    /// Check the blob can be applied to `network` without any partial update
    pub fn check_compatible(&self, network: &QNetwork) -> Result<()> {
        if self.version != CHECKPOINT_VERSION {
            return Err(RLError::Checkpoint(format!(
                "unsupported checkpoint version {} (expected {CHECKPOINT_VERSION})",
                self.version
            )));
        }
        let expected = network.params().layer_sizes();
        if self.layer_sizes != expected {
            return Err(RLError::Checkpoint(format!(
                "architecture mismatch: checkpoint {:?}, network {expected:?}",
                self.layer_sizes
            )));
        }
        if self.activation != network.activation() {
            return Err(RLError::Checkpoint(format!(
                "activation mismatch: checkpoint {:?}, network {:?}",
                self.activation,
                network.activation()
            )));
        }
        if !self.parameters.same_shape(network.params()) {
            return Err(RLError::Checkpoint("parameter shapes do not match layer sizes".into()));
        }
        Ok(())
    }
}

/// A named checkpoint file
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Store backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Checkpoint file location
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a checkpoint has been written
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Write the network's parameters
    ///
    /// The blob goes to a sibling temp file first and is then renamed over the
    /// old checkpoint, so a failure midway leaves the previous file intact.
    pub fn save(&self, network: &QNetwork) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let blob = CheckpointBlob::capture(network);
        let json = serde_json::to_vec(&blob)?;

        let tmp = self.temp_path();
        fs::write(&tmp, json)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Read the checkpoint; `Ok(None)` when no file exists
    pub fn load(&self) -> Result<Option<CheckpointBlob>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let blob = serde_json::from_slice(&bytes)
            .map_err(|e| RLError::Checkpoint(format!("{}: {e}", self.path.display())))?;
        Ok(Some(blob))
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
