use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use vigil::logs::{LogSettings, DEFAULT_DATE_FORMAT};
use vigil::process::{
    ManagedProcessSpec, MemorySampler, Outcome, ResourceLimits, RestartCause, RestartPolicy,
    ShutdownSettings, Supervisor, SupervisorEvent, SupervisorSettings,
};

const MB: u64 = 1024 * 1024;

/// Reports a fixed sequence of samples, then a steady low value
struct ScriptedSampler {
    samples: Vec<u64>,
    calls: Arc<AtomicUsize>,
}

impl MemorySampler for ScriptedSampler {
    fn sample(&mut self, _pid: u32) -> Option<u64> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        Some(self.samples.get(call).copied().unwrap_or(10 * MB))
    }
}

fn create_test_settings(dir: &Path, max_memory: Option<u64>) -> SupervisorSettings {
    SupervisorSettings {
        spec: ManagedProcessSpec {
            name: "hungry".to_string(),
            script: PathBuf::from("/bin/sleep"),
            interpreter: None,
            args: vec!["30".to_string()],
            cwd: None,
            env: HashMap::new(),
            pid_file: None,
        },
        restart: RestartPolicy {
            min_uptime: Duration::from_secs(30),
            ..RestartPolicy::new()
        },
        limits: ResourceLimits::new(max_memory, Duration::from_millis(50)),
        logs: LogSettings {
            out_file: dir.join("hungry-out.log"),
            error_file: dir.join("hungry-error.log"),
            combined_file: dir.join("hungry.log"),
            time: false,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        },
        shutdown: ShutdownSettings {
            kill_timeout: Duration::from_millis(500),
            ..ShutdownSettings::default()
        },
    }
}

#[tokio::test]
async fn test_memory_breach_forces_exactly_one_restart() {
    let temp_dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let sampler = ScriptedSampler {
        samples: vec![50 * MB, 300 * MB],
        calls: Arc::clone(&calls),
    };

    let settings = create_test_settings(temp_dir.path(), Some(200 * MB));
    let supervisor = Supervisor::new(settings).with_sampler(sampler);
    let handle = supervisor.handle();
    let mut events = handle.subscribe();
    let task = tokio::spawn(supervisor.run());

    let mut spawned = Vec::new();
    let mut breaches = Vec::new();
    let mut causes = Vec::new();

    while spawned.len() < 2 {
        match events.recv().await.unwrap() {
            SupervisorEvent::Spawned { pid } => spawned.push(pid),
            SupervisorEvent::MemoryLimitExceeded { sample, limit } => {
                breaches.push((sample, limit))
            }
            SupervisorEvent::RestartScheduled { attempt, cause, .. } => {
                causes.push((attempt, cause))
            }
            SupervisorEvent::Exited { .. } => panic!("a forced restart is not a natural exit"),
            _ => {}
        }
    }

    // Let the second instance be sampled a few more times below the limit
    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.stop();
    let outcome = task.await.unwrap().unwrap();

    while let Ok(event) = events.try_recv() {
        if let SupervisorEvent::MemoryLimitExceeded { sample, limit } = event {
            breaches.push((sample, limit));
        }
    }

    assert_eq!(breaches, vec![(300 * MB, 200 * MB)]);
    assert_eq!(causes, vec![(1, RestartCause::MemoryLimit)]);
    assert_ne!(spawned[0], spawned[1]);
    assert!(calls.load(Ordering::SeqCst) > 2);
    assert_eq!(outcome, Outcome::Stopped);
}

#[tokio::test]
async fn test_sample_at_limit_is_a_breach() {
    let temp_dir = TempDir::new().unwrap();
    let sampler = ScriptedSampler {
        samples: vec![200 * MB],
        calls: Arc::new(AtomicUsize::new(0)),
    };

    let settings = create_test_settings(temp_dir.path(), Some(200 * MB));
    let supervisor = Supervisor::new(settings).with_sampler(sampler);
    let handle = supervisor.handle();
    let mut events = handle.subscribe();
    let task = tokio::spawn(supervisor.run());

    let breach = loop {
        if let SupervisorEvent::MemoryLimitExceeded { sample, .. } = events.recv().await.unwrap() {
            break sample;
        }
    };
    assert_eq!(breach, 200 * MB);

    handle.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_no_limit_means_no_sampling() {
    let temp_dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let sampler = ScriptedSampler {
        samples: vec![u64::MAX],
        calls: Arc::clone(&calls),
    };

    let settings = create_test_settings(temp_dir.path(), None);
    let supervisor = Supervisor::new(settings).with_sampler(sampler);
    let handle = supervisor.handle();
    let mut events = handle.subscribe();
    let task = tokio::spawn(supervisor.run());

    assert!(matches!(
        events.recv().await.unwrap(),
        SupervisorEvent::Spawned { .. }
    ));
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.stop();
    task.await.unwrap().unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_exit_reports_last_memory_sample() {
    let temp_dir = TempDir::new().unwrap();
    let sampler = ScriptedSampler {
        samples: vec![],
        calls: Arc::new(AtomicUsize::new(0)),
    };

    let mut settings = create_test_settings(temp_dir.path(), Some(200 * MB));
    settings.spec.args = vec!["0.3".to_string()];
    settings.restart.enabled = false;

    let supervisor = Supervisor::new(settings).with_sampler(sampler);
    let mut events = supervisor.handle().subscribe();
    let outcome = supervisor.run().await.unwrap();

    assert_eq!(outcome, Outcome::ChildExited { code: Some(0) });
    let last_memory = loop {
        if let SupervisorEvent::Exited { last_memory, .. } = events.recv().await.unwrap() {
            break last_memory;
        }
    };
    assert_eq!(last_memory, Some(10 * MB));
}

#[tokio::test]
async fn test_sysinfo_sampler_reports_live_child() {
    use vigil::process::SysinfoSampler;

    let mut child = tokio::process::Command::new("/bin/sleep")
        .arg("5")
        .kill_on_drop(true)
        .spawn()
        .unwrap();
    let pid = child.id().unwrap();

    let mut sampler = SysinfoSampler::new();
    let rss = sampler.sample(pid);
    assert!(rss.is_some_and(|bytes| bytes > 0));

    child.kill().await.unwrap();
}
