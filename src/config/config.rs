//! Configuration structures and loading

use std::path::PathBuf;
use anyhow::{Context, Result};
use serde::Deserialize;

/// Main daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    /// Enable debug mode
    #[serde(default)]
    pub debug: bool,

    /// RPC socket configuration
    pub rpc: RpcConfiguration,

    /// System paths and settings
    pub system: SystemConfiguration,

    /// Container lifecycle defaults
    #[serde(default)]
    pub container: ContainerConfiguration,

    /// Volume engine configuration
    #[serde(default)]
    pub volume: VolumeConfiguration,
}

impl Configuration {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let config_path = std::path::Path::new(path);
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("failed to read config file: {}", path))?;

        let mut config: Configuration = toml::from_str(&content)
            .with_context(|| "failed to parse configuration")?;

        let base_dir = config_path
            .parent()
            .and_then(|p| if p.as_os_str().is_empty() { None } else { Some(p) })
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        config.system.resolve_paths(&base_dir);

        std::fs::create_dir_all(&config.system.data_directory)?;
        std::fs::create_dir_all(&config.system.node_store_directory)?;
        std::fs::create_dir_all(&config.system.volume_directory)?;
        std::fs::create_dir_all(&config.system.log_directory)?;
        if let Some(parent) = config.rpc.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Ok(config)
    }
}

/// RPC socket configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfiguration {
    /// Unix stream socket path the daemon listens on.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Maximum accepted frame length, in bytes, for both directions
    /// (spec §6 "configured maximum frame length").
    #[serde(default = "default_max_frame_length")]
    pub max_frame_length: usize,

    /// Socket file permission mode (octal).
    #[serde(default = "default_socket_mode")]
    pub socket_mode: u32,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/run/portod/portod.sock")
}

fn default_max_frame_length() -> usize {
    16 * 1024 * 1024
}

fn default_socket_mode() -> u32 {
    0o660
}

/// System paths and settings
#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfiguration {
    /// Root directory the daemon owns for persisted and runtime state.
    #[serde(default = "default_data_directory")]
    pub data_directory: PathBuf,

    /// Directory holding the persistent node store's sqlite database.
    #[serde(default = "default_node_store_directory")]
    pub node_store_directory: PathBuf,

    /// Directory auto-allocated volume storage lives under when a caller
    /// does not supply one (spec §4.3, Volume Configure).
    #[serde(default = "default_volume_directory")]
    pub volume_directory: PathBuf,

    /// Log directory.
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,

    /// Root of the cgroup filesystem this daemon materializes its leaf
    /// cgroups under (one subsystem subtree per container).
    #[serde(default = "default_cgroup_root")]
    pub cgroup_root: PathBuf,

    /// Bytes of host memory reserved and never committed to guarantees
    /// (spec §3 invariant: "total committed guarantees + reserve ≤ host
    /// memory").
    #[serde(default = "default_memory_reserve")]
    pub memory_reserve: u64,

    /// Grace period between SIGTERM and SIGKILL on Stop (spec §4.2).
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

impl SystemConfiguration {
    pub fn resolve_paths(&mut self, base_dir: &std::path::Path) {
        self.data_directory = Self::resolve_path(&self.data_directory, base_dir);
        self.node_store_directory = Self::resolve_path(&self.node_store_directory, base_dir);
        self.volume_directory = Self::resolve_path(&self.volume_directory, base_dir);
        self.log_directory = Self::resolve_path(&self.log_directory, base_dir);
    }

    fn resolve_path(path: &std::path::Path, base_dir: &std::path::Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            let resolved = base_dir.join(path);
            resolved
                .canonicalize()
                .unwrap_or_else(|_| Self::normalize_path(&resolved))
        }
    }

    fn normalize_path(path: &std::path::Path) -> PathBuf {
        let mut components = Vec::new();
        for component in path.components() {
            match component {
                std::path::Component::ParentDir => {
                    components.pop();
                }
                std::path::Component::CurDir => {}
                c => components.push(c),
            }
        }
        components.iter().collect()
    }
}

fn default_data_directory() -> PathBuf {
    PathBuf::from("/var/lib/portod")
}

fn default_node_store_directory() -> PathBuf {
    PathBuf::from("/var/lib/portod/store")
}

fn default_volume_directory() -> PathBuf {
    PathBuf::from("/var/lib/portod/volumes")
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("/var/log/portod")
}

fn default_cgroup_root() -> PathBuf {
    PathBuf::from("/sys/fs/cgroup/portod")
}

fn default_memory_reserve() -> u64 {
    256 * 1024 * 1024
}

fn default_stop_timeout_secs() -> u64 {
    30
}

/// Container lifecycle defaults (spec §4.2, §6 property catalog defaults).
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerConfiguration {
    /// Default value of `max_respawns` when a container sets `respawn=true`
    /// without an explicit cap.
    #[serde(default = "default_max_respawns")]
    pub default_max_respawns: u32,

    /// Group names whose members may control any container they're not
    /// the owner of (spec §4.4 access matrix: "porto-containers").
    #[serde(default = "default_privileged_groups")]
    pub privileged_groups: Vec<String>,
}

impl Default for ContainerConfiguration {
    fn default() -> Self {
        Self {
            default_max_respawns: default_max_respawns(),
            privileged_groups: default_privileged_groups(),
        }
    }
}

fn default_max_respawns() -> u32 {
    -1i32 as u32 // unlimited, stored as the property's own sentinel
}

fn default_privileged_groups() -> Vec<String> {
    vec!["porto-containers".into()]
}

/// Volume engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VolumeConfiguration {
    /// Whether the host kernel/filesystem supports ext4 project quotas
    /// (gates the Native and Overlay backends, spec §4.3).
    #[serde(default = "default_true")]
    pub quota_supported: bool,

    /// Whether overlayfs is available (gates the Overlay backend).
    #[serde(default = "default_true")]
    pub overlay_supported: bool,
}

impl Default for VolumeConfiguration {
    fn default() -> Self {
        Self {
            quota_supported: true,
            overlay_supported: true,
        }
    }
}

fn default_true() -> bool {
    true
}
