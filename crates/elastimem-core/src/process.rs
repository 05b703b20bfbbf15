use crate::{Error, Result};
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fs;

/// Per-process facts needed by the activity filter
pub trait ProcessProbe: Send + Sync {
    /// Lines of the process's mount table
    fn mount_table(&self, pid: u32) -> Result<Vec<String>>;

    /// Whether the process still exists
    fn is_alive(&self, pid: u32) -> bool;
}

/// Process probe backed by `/proc` and `kill(pid, 0)`
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcFs;

impl ProcFs {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessProbe for ProcFs {
    fn mount_table(&self, pid: u32) -> Result<Vec<String>> {
        let path = format!("/proc/{}/mounts", pid);
        let content = fs::read_to_string(&path)
            .map_err(|e| Error::Process(format!("Failed to read {}: {}", path, e)))?;

        Ok(content.lines().map(str::to_owned).collect())
    }

    /// Uses kill(pid, 0) - no signal is delivered, only existence is checked
    fn is_alive(&self, pid: u32) -> bool {
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };

        match kill(Pid::from_raw(raw), None) {
            Ok(_) => true,
            Err(nix::errno::Errno::EPERM) => true, // No permission, but process exists
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_process_is_alive() {
        let probe = ProcFs::new();
        assert!(probe.is_alive(std::process::id()));
    }

    #[test]
    fn test_missing_process_is_dead() {
        let probe = ProcFs::new();
        // Above the kernel's pid_max ceiling (4194304)
        assert!(!probe.is_alive(9_999_999));
        assert!(!probe.is_alive(u32::MAX));
    }

    #[test]
    fn test_own_mount_table() {
        let probe = ProcFs::new();
        let lines = probe.mount_table(std::process::id()).unwrap();
        assert!(lines.iter().any(|line| line.contains("proc")));
    }

    #[test]
    fn test_missing_mount_table() {
        let probe = ProcFs::new();
        let err = probe.mount_table(9_999_999).unwrap_err();
        assert!(matches!(err, Error::Process(_)));
    }
}
