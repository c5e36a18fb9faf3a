//! `portod diagnostics` — host readiness for the four volume backends and
//! the cgroup v2 runtime.

use anyhow::Result;
use sysinfo::System;

pub async fn run() -> Result<()> {
    println!("portod diagnostics");
    println!("===================\n");

    println!("System Information:");
    println!("-------------------");
    let mut sys = System::new_all();
    sys.refresh_all();
    println!("  OS: {} {}", System::name().unwrap_or_default(), System::os_version().unwrap_or_default());
    println!("  Kernel: {}", System::kernel_version().unwrap_or_default());
    println!("  Hostname: {}", System::host_name().unwrap_or_default());
    println!("  CPUs: {}", sys.cpus().len());
    println!("  Total Memory: {} MB", sys.total_memory() / 1024 / 1024);
    println!("  Used Memory: {} MB", sys.used_memory() / 1024 / 1024);
    println!("  Uptime: {} seconds", System::uptime());

    println!("\nContainer Runtime:");
    println!("-------------------");
    check_path("cgroup v2 unified hierarchy", std::path::Path::new("/sys/fs/cgroup/cgroup.controllers"));
    check_path("loop device control", std::path::Path::new("/dev/loop-control"));
    check_program("mkfs.ext4");
    check_program("losetup");
    check_program("setquota");
    check_program("ip");

    println!("\nDiagnostics complete.");
    Ok(())
}

fn check_path(label: &str, path: &std::path::Path) {
    if path.exists() {
        println!("  [ok]      {}", label);
    } else {
        println!("  [missing] {} ({})", label, path.display());
    }
}

fn check_program(name: &str) {
    let found = std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(name).is_file()))
        .unwrap_or(false);
    if found {
        println!("  [ok]      {}", name);
    } else {
        println!("  [missing] {}", name);
    }
}
