//! Process-wide registry of running encoder processes.
//!
//! Maps an orchestration key (the user id for the eager ladder, the output
//! key for on-demand singles) to a running ffmpeg subprocess. At most one
//! process per key: a second `add` for a live key is rejected and the
//! rejected child reaped, never silently replaced. Every registered process
//! gets a watcher task that removes the entry when the process exits, so no
//! external reaper is needed.
//!
//! Constructed once at startup and passed by `Arc` to every component that
//! needs it; mutation goes through one mutex because entries are touched
//! both from request handlers (stop) and from watcher tasks (self-removal).

use crate::domain::stream::Quality;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tokio::process::Child;
use tokio::sync::oneshot;
use tracing::{info, warn};

struct Registration {
    pid: u32,
    /// Monotonic add counter, so a watcher outliving its registration can
    /// tell the entry was replaced and must not touch it.
    generation: u64,
    started_at: SystemTime,
    renditions: Vec<Quality>,
    kill: Option<oneshot::Sender<()>>,
}

/// Metadata snapshot for a registered process.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub key: String,
    pub pid: u32,
    pub started_at: SystemTime,
    pub renditions: Vec<Quality>,
}

#[derive(Debug)]
pub enum RegistryError {
    /// A process is already registered under this key.
    AlreadyRunning(String),
    /// The child had no pid, i.e. it was already reaped.
    NoPid,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::AlreadyRunning(key) => {
                write!(f, "process already registered for key: {}", key)
            }
            RegistryError::NoPid => write!(f, "child process has no pid"),
        }
    }
}

impl Error for RegistryError {}

#[derive(Default)]
pub struct ProcessRegistry {
    inner: Arc<Mutex<HashMap<String, Registration>>>,
    generation: AtomicU64,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a spawned encoder under `key` and start its watcher task.
    /// On a duplicate key the new child is killed and the call fails; the
    /// earlier registration stays authoritative.
    pub fn add(
        &self,
        key: &str,
        mut child: Child,
        renditions: Vec<Quality>,
    ) -> Result<u32, RegistryError> {
        let pid = child.id().ok_or(RegistryError::NoPid)?;
        let (kill_tx, kill_rx) = oneshot::channel();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        {
            let mut map = self.inner.lock().unwrap();
            if map.contains_key(key) {
                drop(map);
                tokio::spawn(async move {
                    let _ = child.kill().await;
                });
                return Err(RegistryError::AlreadyRunning(key.to_string()));
            }
            map.insert(
                key.to_string(),
                Registration {
                    pid,
                    generation,
                    started_at: SystemTime::now(),
                    renditions,
                    kill: Some(kill_tx),
                },
            );
        }

        let inner = self.inner.clone();
        let watch_key = key.to_string();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => info!("process {} (pid {}) exited: {}", watch_key, pid, status),
                    Err(e) => warn!("process {} (pid {}) wait failed: {}", watch_key, pid, e),
                },
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        warn!("failed to kill process {} (pid {}): {}", watch_key, pid, e);
                    }
                    let _ = child.wait().await;
                    info!("process {} (pid {}) killed", watch_key, pid);
                }
            }
            // `remove` may have dropped the entry already and a re-publish
            // re-registered the key; only deregister our own generation.
            let mut map = inner.lock().unwrap();
            if map.get(&watch_key).map_or(false, |r| r.generation == generation) {
                map.remove(&watch_key);
            }
        });

        Ok(pid)
    }

    pub fn get(&self, key: &str) -> Option<ProcessInfo> {
        self.inner.lock().unwrap().get(key).map(|r| ProcessInfo {
            key: key.to_string(),
            pid: r.pid,
            started_at: r.started_at,
            renditions: r.renditions.clone(),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().unwrap().contains_key(key)
    }

    /// Terminate and deregister the process under `key`. The entry is gone
    /// once this returns; the watcher task delivers the actual signal.
    /// Returns false when no such key is registered.
    pub fn remove(&self, key: &str) -> bool {
        let registration = self.inner.lock().unwrap().remove(key);
        match registration {
            Some(mut r) => {
                if let Some(kill) = r.kill.take() {
                    let _ = kill.send(());
                }
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::process::Command;

    fn long_lived() -> Child {
        Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("failed to spawn sleep")
    }

    #[tokio::test]
    async fn add_then_remove_terminates_and_deregisters() {
        let registry = ProcessRegistry::new();
        let pid = registry
            .add("u1", long_lived(), vec![Quality::P720])
            .unwrap();
        assert!(pid > 0);
        assert!(registry.contains("u1"));
        assert_eq!(registry.get("u1").unwrap().renditions, vec![Quality::P720]);

        assert!(registry.remove("u1"));
        assert!(!registry.contains("u1"));
        // second remove reports that nothing was registered
        assert!(!registry.remove("u1"));
    }

    #[tokio::test]
    async fn duplicate_add_is_rejected_and_first_survives() {
        let registry = ProcessRegistry::new();
        let first_pid = registry.add("u1", long_lived(), vec![]).unwrap();

        let result = registry.add("u1", long_lived(), vec![]);
        assert!(matches!(result, Err(RegistryError::AlreadyRunning(_))));
        assert_eq!(registry.get("u1").unwrap().pid, first_pid);
        assert_eq!(registry.len(), 1);

        registry.remove("u1");
    }

    #[tokio::test]
    async fn stale_watcher_leaves_replacement_registered() {
        let registry = ProcessRegistry::new();
        registry.add("u1", long_lived(), vec![]).unwrap();
        assert!(registry.remove("u1"));

        // re-register immediately, before the first watcher finishes
        // delivering the kill
        let replacement_pid = registry.add("u1", long_lived(), vec![]).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(
            registry.get("u1").map(|info| info.pid),
            Some(replacement_pid)
        );
        registry.remove("u1");
    }

    #[tokio::test]
    async fn natural_exit_reaps_the_entry() {
        let registry = ProcessRegistry::new();
        let child = Command::new("true").spawn().expect("failed to spawn true");
        registry.add("u1", child, vec![]).unwrap();

        // the watcher removes the entry once the process exits
        for _ in 0..50 {
            if !registry.contains("u1") {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("registry entry was not reaped after process exit");
    }

    #[tokio::test]
    async fn independent_keys_do_not_interfere() {
        let registry = ProcessRegistry::new();
        registry.add("u1", long_lived(), vec![]).unwrap();
        registry.add("u2", long_lived(), vec![]).unwrap();
        assert_eq!(registry.len(), 2);

        assert!(registry.remove("u1"));
        assert!(registry.contains("u2"));
        registry.remove("u2");
        assert!(registry.is_empty());
    }
}
