use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::broadcast;
use vigil::logs::{LogSettings, DEFAULT_DATE_FORMAT};
use vigil::process::{
    ManagedProcessSpec, Outcome, ResourceLimits, RestartCause, RestartPolicy, ShutdownSettings,
    Supervisor, SupervisorEvent, SupervisorSettings,
};

fn create_test_settings(dir: &Path, name: &str, script: &str) -> SupervisorSettings {
    SupervisorSettings {
        spec: ManagedProcessSpec {
            name: name.to_string(),
            script: PathBuf::from("/bin/sh"),
            interpreter: None,
            args: vec!["-c".to_string(), script.to_string()],
            cwd: None,
            env: HashMap::new(),
            pid_file: None,
        },
        restart: RestartPolicy {
            min_uptime: Duration::from_secs(30),
            ..RestartPolicy::new()
        },
        limits: ResourceLimits::default(),
        logs: LogSettings {
            out_file: dir.join(format!("{}-out.log", name)),
            error_file: dir.join(format!("{}-error.log", name)),
            combined_file: dir.join(format!("{}.log", name)),
            time: false,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        },
        shutdown: ShutdownSettings {
            kill_timeout: Duration::from_millis(500),
            ..ShutdownSettings::default()
        },
    }
}

/// Drain events until the supervisor reports it terminated
async fn collect_events(mut events: broadcast::Receiver<SupervisorEvent>) -> Vec<SupervisorEvent> {
    let mut seen = Vec::new();
    loop {
        match events.recv().await {
            Ok(event) => {
                let done = matches!(event, SupervisorEvent::Terminated { .. });
                seen.push(event);
                if done {
                    return seen;
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return seen,
        }
    }
}

fn count_spawns(events: &[SupervisorEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, SupervisorEvent::Spawned { .. }))
        .count()
}

#[tokio::test]
async fn test_budget_exhausted_on_eleventh_crash() {
    let temp_dir = TempDir::new().unwrap();
    let mut settings = create_test_settings(temp_dir.path(), "crashy", "exit 1");
    settings.restart.max_restarts = 10;
    settings.restart.window = Duration::from_secs(60);

    let supervisor = Supervisor::new(settings);
    let collector = tokio::spawn(collect_events(supervisor.handle().subscribe()));

    let outcome = tokio::time::timeout(Duration::from_secs(20), supervisor.run())
        .await
        .expect("supervisor should give up on its own")
        .unwrap();
    let events = collector.await.unwrap();

    assert_eq!(outcome, Outcome::BudgetExhausted { restarts: 10 });
    assert_eq!(outcome.exit_code(), 1);

    // One initial start plus ten restarts
    assert_eq!(count_spawns(&events), 11);
    assert!(events.contains(&SupervisorEvent::RestartBudgetExhausted { restarts: 10 }));
    assert_eq!(
        events.last(),
        Some(&SupervisorEvent::Terminated {
            outcome: Outcome::BudgetExhausted { restarts: 10 },
            restarts: 10,
        })
    );

    let attempts: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            SupervisorEvent::RestartScheduled { attempt, cause, .. } => {
                assert_eq!(*cause, RestartCause::Crash);
                Some(*attempt)
            }
            _ => None,
        })
        .collect();
    assert_eq!(attempts, (1..=10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_backoff_grows_linearly() {
    let temp_dir = TempDir::new().unwrap();
    let mut settings = create_test_settings(temp_dir.path(), "backoff", "exit 3");
    settings.restart.max_restarts = 2;
    settings.restart.base_delay = Duration::from_millis(100);
    settings.restart.backoff_increment = Duration::from_millis(50);

    let supervisor = Supervisor::new(settings);
    let collector = tokio::spawn(collect_events(supervisor.handle().subscribe()));

    let started = Instant::now();
    let outcome = supervisor.run().await.unwrap();
    let elapsed = started.elapsed();
    let events = collector.await.unwrap();

    assert_eq!(outcome, Outcome::BudgetExhausted { restarts: 2 });

    let delays: Vec<Duration> = events
        .iter()
        .filter_map(|e| match e {
            SupervisorEvent::RestartScheduled { delay, .. } => Some(*delay),
            _ => None,
        })
        .collect();
    assert_eq!(
        delays,
        vec![Duration::from_millis(150), Duration::from_millis(200)]
    );
    assert!(elapsed >= Duration::from_millis(350));
}

#[tokio::test]
async fn test_spawn_failure_counts_as_crash() {
    let temp_dir = TempDir::new().unwrap();
    let mut settings = create_test_settings(temp_dir.path(), "missing", "exit 0");
    settings.spec.script = temp_dir.path().join("does-not-exist");
    settings.restart.max_restarts = 3;

    let supervisor = Supervisor::new(settings);
    let collector = tokio::spawn(collect_events(supervisor.handle().subscribe()));

    let outcome = supervisor.run().await.unwrap();
    let events = collector.await.unwrap();

    assert_eq!(outcome, Outcome::BudgetExhausted { restarts: 3 });
    assert_eq!(count_spawns(&events), 0);

    let failures = events
        .iter()
        .filter(|e| matches!(e, SupervisorEvent::SpawnFailed { .. }))
        .count();
    assert_eq!(failures, 4);
    assert!(events.iter().any(|e| matches!(
        e,
        SupervisorEvent::RestartScheduled {
            cause: RestartCause::SpawnFailure,
            ..
        }
    )));
}

#[tokio::test]
async fn test_stable_run_resets_counter() {
    let temp_dir = TempDir::new().unwrap();
    let marker = temp_dir.path().join("ran-once");
    // First run crashes immediately, later runs stay up past min_uptime then crash
    let script = format!(
        "if [ -f {m} ]; then sleep 0.4; exit 1; else touch {m}; exit 1; fi",
        m = marker.display()
    );
    let mut settings = create_test_settings(temp_dir.path(), "stable", &script);
    settings.restart.max_restarts = 3;
    settings.restart.min_uptime = Duration::from_millis(200);

    let supervisor = Supervisor::new(settings);
    let handle = supervisor.handle();
    let mut events = handle.subscribe();
    let task = tokio::spawn(supervisor.run());

    let mut attempts = Vec::new();
    let mut stable_seen = 0;
    while attempts.len() < 4 {
        match events.recv().await.unwrap() {
            SupervisorEvent::RestartScheduled { attempt, .. } => attempts.push(attempt),
            SupervisorEvent::Stable => stable_seen += 1,
            _ => {}
        }
    }
    handle.stop();
    let outcome = task.await.unwrap().unwrap();

    // Every run after the first was stable, so each crash is attempt 1 again
    assert_eq!(attempts, vec![1, 1, 1, 1]);
    assert!(stable_seen >= 3);
    assert_eq!(outcome, Outcome::Stopped);
}

#[tokio::test]
async fn test_operator_restart_does_not_use_budget() {
    let temp_dir = TempDir::new().unwrap();
    let mut settings = create_test_settings(temp_dir.path(), "manual", "sleep 30");
    settings.restart.max_restarts = 0;

    let supervisor = Supervisor::new(settings);
    let handle = supervisor.handle();
    let mut events = handle.subscribe();
    let task = tokio::spawn(supervisor.run());

    let first = match events.recv().await.unwrap() {
        SupervisorEvent::Spawned { pid } => pid,
        other => panic!("Expected Spawned, got {:?}", other),
    };

    handle.restart().await.unwrap();

    let second = loop {
        match events.recv().await.unwrap() {
            SupervisorEvent::RestartScheduled { attempt, cause, .. } => {
                assert_eq!(attempt, 0);
                assert_eq!(cause, RestartCause::Manual);
            }
            SupervisorEvent::Spawned { pid } => break pid,
            SupervisorEvent::RestartBudgetExhausted { .. } => {
                panic!("operator restart must not consume the budget")
            }
            _ => {}
        }
    };
    assert_ne!(first, second);

    handle.stop();
    assert_eq!(task.await.unwrap().unwrap(), Outcome::Stopped);

    let restarts = loop {
        if let SupervisorEvent::Terminated { restarts, .. } = events.recv().await.unwrap() {
            break restarts;
        }
    };
    assert_eq!(restarts, 1);
}
