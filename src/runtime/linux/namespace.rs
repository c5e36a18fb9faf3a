//! Namespace isolation flags for `isolate` (spec §6).
//!
//! `isolate=true` gives a container its own PID, mount, UTS and IPC
//! namespaces (akin to porto's "full isolation" containers); `isolate=false`
//! runs in the parent's namespaces ("virtual" containers sharing the host
//! view).

use nix::sched::CloneFlags;

pub fn clone_flags(isolate: bool) -> CloneFlags {
    if !isolate {
        return CloneFlags::empty();
    }
    CloneFlags::CLONE_NEWNS | CloneFlags::CLONE_NEWPID | CloneFlags::CLONE_NEWUTS | CloneFlags::CLONE_NEWIPC
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unisolated_container_shares_host_namespaces() {
        assert!(clone_flags(false).is_empty());
    }

    #[test]
    fn isolated_container_gets_pid_and_mount_namespaces() {
        let flags = clone_flags(true);
        assert!(flags.contains(CloneFlags::CLONE_NEWPID));
        assert!(flags.contains(CloneFlags::CLONE_NEWNS));
    }
}
