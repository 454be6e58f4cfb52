//! On-disk namespace store
//!
//! One YAML record per namespace under `<config-dir>/namespaces/`. Writes
//! are serialized in-process by a mutex and across processes by an
//! exclusive `fs2` lock on `<name>.lock`; records are replaced atomically
//! (temp file + rename).

use crate::plane::{ControlPlane, SshSpec};
use airgap::ContainerEngine;
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Everything fogctl knows about one namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Namespace {
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane: Option<ControlPlane>,
    #[serde(default)]
    pub agents: Vec<AgentRecord>,
    #[serde(default)]
    pub volumes: Vec<VolumeRecord>,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
            control_plane: None,
            agents: Vec::new(),
            volumes: Vec::new(),
        }
    }

    pub fn agent(&self, name: &str) -> Option<&AgentRecord> {
        self.agents.iter().find(|a| a.name == name)
    }

    /// Insert or replace an agent record by name
    pub fn upsert_agent(&mut self, record: AgentRecord) {
        match self.agents.iter_mut().find(|a| a.name == record.name) {
            Some(slot) => *slot = record,
            None => self.agents.push(record),
        }
    }

    pub fn remove_agent(&mut self, name: &str) -> Option<AgentRecord> {
        let index = self.agents.iter().position(|a| a.name == name)?;
        Some(self.agents.remove(index))
    }

    pub fn volume(&self, name: &str) -> Option<&VolumeRecord> {
        self.volumes.iter().find(|v| v.name == name)
    }

    pub fn upsert_volume(&mut self, record: VolumeRecord) {
        match self.volumes.iter_mut().find(|v| v.name == record.name) {
            Some(slot) => *slot = record,
            None => self.volumes.push(record),
        }
    }

    pub fn remove_volume(&mut self, name: &str) -> Option<VolumeRecord> {
        let index = self.volumes.iter().position(|v| v.name == name)?;
        Some(self.volumes.remove(index))
    }

    /// Whether the namespace still owns anything
    pub fn is_empty(&self) -> bool {
        self.control_plane.is_none() && self.agents.is_empty() && self.volumes.is_empty()
    }
}

/// A provisioned agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub name: String,
    pub host: String,
    /// Absent for agents running on this machine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh: Option<SshSpec>,
    pub container_engine: ContainerEngine,
    pub created_at: DateTime<Utc>,
}

impl AgentRecord {
    pub fn is_local(&self) -> bool {
        self.ssh.is_none()
    }
}

/// A directory shipped to agents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeRecord {
    pub name: String,
    pub source: String,
    pub destination: String,
    pub permissions: String,
    pub agents: Vec<String>,
}

/// Validate a namespace name (lowercase alphanumerics and `-`, max 63)
pub fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-');
    if !valid {
        bail!(
            "invalid namespace name '{}': use lowercase letters, digits and '-'",
            name
        );
    }
    Ok(())
}

pub struct NamespaceStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl NamespaceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.yaml", name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.record_path(name).exists()
    }

    pub fn load(&self, name: &str) -> Result<Namespace> {
        validate_name(name)?;
        let path = self.record_path(name);
        if !path.exists() {
            bail!(
                "namespace {} does not exist (create it with `fogctl namespace create {}`)",
                name,
                name
            );
        }
        read_record(&path)
    }

    /// Names of all namespaces, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read {}", self.dir.display()))?
        {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "yaml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Create a namespace; fails if it exists
    pub fn create(&self, name: &str) -> Result<Namespace> {
        validate_name(name)?;
        let _guard = self.lock.lock().map_err(|_| anyhow::anyhow!("namespace store poisoned"))?;
        let _file_lock = self.file_lock(name)?;
        if self.exists(name) {
            bail!("namespace {} already exists", name);
        }
        let namespace = Namespace::new(name);
        write_record(&self.record_path(name), &namespace)?;
        log::info!("Created namespace {}", name);
        Ok(namespace)
    }

    /// Load a namespace, creating it first if missing
    pub fn ensure(&self, name: &str) -> Result<Namespace> {
        if self.exists(name) {
            return self.load(name);
        }
        match self.create(name) {
            Ok(namespace) => Ok(namespace),
            // Lost a race with another writer
            Err(_) if self.exists(name) => self.load(name),
            Err(e) => Err(e),
        }
    }

    /// Load, modify and persist a namespace under the store lock
    ///
    /// Nothing is written when `f` fails.
    pub fn update<T>(&self, name: &str, f: impl FnOnce(&mut Namespace) -> Result<T>) -> Result<T> {
        validate_name(name)?;
        let _guard = self.lock.lock().map_err(|_| anyhow::anyhow!("namespace store poisoned"))?;
        let _file_lock = self.file_lock(name)?;

        let path = self.record_path(name);
        let mut namespace = if path.exists() {
            read_record(&path)?
        } else {
            Namespace::new(name)
        };
        let value = f(&mut namespace)?;
        write_record(&path, &namespace)?;
        Ok(value)
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let _guard = self.lock.lock().map_err(|_| anyhow::anyhow!("namespace store poisoned"))?;
        let path = self.record_path(name);
        if !path.exists() {
            bail!("namespace {} does not exist", name);
        }
        fs::remove_file(&path)
            .with_context(|| format!("Failed to delete {}", path.display()))?;
        let _ = fs::remove_file(self.dir.join(format!("{}.lock", name)));
        log::info!("Deleted namespace {}", name);
        Ok(())
    }

    fn file_lock(&self, name: &str) -> Result<FileLock> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let path = self.dir.join(format!("{}.lock", name));
        let file = fs::File::create(&path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("Failed to lock {}", path.display()))?;
        Ok(FileLock { file })
    }
}

/// Releases the advisory lock on drop
struct FileLock {
    file: fs::File,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn read_record(path: &Path) -> Result<Namespace> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read namespace file: {}", path.display()))?;
    serde_yaml_ng::from_str(&content)
        .with_context(|| format!("Failed to parse namespace file: {}", path.display()))
}

fn write_record(path: &Path, namespace: &Namespace) -> Result<()> {
    let content = serde_yaml_ng::to_string(namespace).context("Failed to serialize namespace")?;
    let tmp = path.with_extension("yaml.tmp");
    fs::write(&tmp, content).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    log::debug!("Saved namespace {}", path.display());
    Ok(())
}
