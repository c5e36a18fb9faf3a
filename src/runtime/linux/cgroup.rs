//! cgroup v2 leaf management (spec §5 "Resource Model": memory and CPU
//! accounting live in a per-container cgroup under the daemon's root
//! cgroup).

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DaemonError, ErrorCode};

fn io_err(path: &Path, e: std::io::Error) -> DaemonError {
    DaemonError::with_errno(ErrorCode::ResourceNotAvailable, format!("{}: {}", path.display(), e), e.raw_os_error().unwrap_or(0))
}

/// Leaf cgroup path for a container under `cgroup_root` (spec §6
/// "cgroup_root").
pub fn leaf_path(cgroup_root: &Path, container_name: &str) -> PathBuf {
    cgroup_root.join(container_name.trim_start_matches('/').replace('/', "_"))
}

pub fn create(path: &Path) -> Result<(), DaemonError> {
    fs::create_dir_all(path).map_err(|e| io_err(path, e))
}

pub fn remove(path: &Path) -> Result<(), DaemonError> {
    if !path.exists() {
        return Ok(());
    }
    fs::remove_dir(path).map_err(|e| io_err(path, e))
}

pub fn add_pid(path: &Path, pid: u32) -> Result<(), DaemonError> {
    write(path, "cgroup.procs", &pid.to_string())
}

pub fn set_memory_max(path: &Path, bytes: u64) -> Result<(), DaemonError> {
    let value = if bytes == 0 { "max".to_string() } else { bytes.to_string() };
    write(path, "memory.max", &value)
}

pub fn set_memory_low(path: &Path, bytes: u64) -> Result<(), DaemonError> {
    write(path, "memory.low", &bytes.to_string())
}

/// `cpu_priority` (0..99) maps linearly onto cgroup v2's cpu.weight range
/// (1..10000).
pub fn set_cpu_weight(path: &Path, priority: i64) -> Result<(), DaemonError> {
    let weight = 1 + (priority.clamp(0, 99) as u64) * (9999 / 99);
    write(path, "cpu.weight", &weight.to_string())
}

pub fn freeze(path: &Path, frozen: bool) -> Result<(), DaemonError> {
    write(path, "cgroup.freeze", if frozen { "1" } else { "0" })
}

pub fn read_memory_current(path: &Path) -> Result<u64, DaemonError> {
    read(path, "memory.current").map(|s| s.trim().parse().unwrap_or(0))
}

pub fn read_cpu_usage_usec(path: &Path) -> Result<u64, DaemonError> {
    let stat = read(path, "cpu.stat")?;
    for line in stat.lines() {
        if let Some(value) = line.strip_prefix("usage_usec ") {
            return Ok(value.trim().parse().unwrap_or(0));
        }
    }
    Ok(0)
}

fn write(cgroup: &Path, file: &str, value: &str) -> Result<(), DaemonError> {
    let path = cgroup.join(file);
    fs::write(&path, value).map_err(|e| io_err(&path, e))
}

fn read(cgroup: &Path, file: &str) -> Result<String, DaemonError> {
    let path = cgroup.join(file);
    fs::read_to_string(&path).map_err(|e| io_err(&path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_path_flattens_hierarchical_name() {
        let root = Path::new("/sys/fs/cgroup/portod");
        assert_eq!(leaf_path(root, "/a/b"), root.join("a_b"));
    }

    #[test]
    fn cpu_weight_is_monotonic_in_priority() {
        let low = 1 + 0u64 * (9999 / 99);
        let high = 1 + 99u64 * (9999 / 99);
        assert!(low < high);
    }
}
