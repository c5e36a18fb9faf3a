//! `portod check-config` — parse and validate a configuration file without
//! starting the daemon.

use anyhow::Result;
use tracing::info;

use portod::config::Configuration;

pub async fn run(config_path: &str) -> Result<()> {
    let config = Configuration::load(config_path)?;

    info!("configuration at {} is valid", config_path);
    println!("rpc.socket_path:        {}", config.rpc.socket_path.display());
    println!("rpc.max_frame_length:   {} bytes", config.rpc.max_frame_length);
    println!("system.data_directory:  {}", config.system.data_directory.display());
    println!("system.cgroup_root:     {}", config.system.cgroup_root.display());
    println!("system.memory_reserve:  {} bytes", config.system.memory_reserve);
    println!("container.default_max_respawns: {}", config.container.default_max_respawns as i32);
    println!("container.privileged_groups:    {:?}", config.container.privileged_groups);
    println!("volume.quota_supported:   {}", config.volume.quota_supported);
    println!("volume.overlay_supported: {}", config.volume.overlay_supported);

    Ok(())
}
