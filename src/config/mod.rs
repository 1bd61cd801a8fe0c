pub mod units;

use crate::error::{Result, VigilError};
use crate::logs::{LogSettings, DEFAULT_DATE_FORMAT};
use crate::process::shutdown::parse_signal;
use crate::process::{
    ManagedProcessSpec, ResourceLimits, RestartPolicy, ShutdownSettings, SupervisorSettings,
};
use chrono::format::{Item, StrftimeItems};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Execution mode of the managed process. Only `fork` is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    #[serde(alias = "fork_mode")]
    Fork,
    #[serde(alias = "cluster_mode")]
    Cluster,
}

/// Application configuration for the single supervised process
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Process name
    pub name: String,

    /// Path to the entry script
    pub script: PathBuf,

    /// Interpreter for the script; `"none"` runs the script directly
    #[serde(default)]
    pub interpreter: Option<String>,

    /// Command-line arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory for the process
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Whether to automatically restart on exit
    #[serde(default = "default_autorestart")]
    pub autorestart: bool,

    /// Base delay before every restart
    #[serde(default, deserialize_with = "units::duration")]
    pub restart_delay: Duration,

    /// Extra delay added per consecutive restart
    #[serde(default, deserialize_with = "units::duration")]
    pub exp_backoff_restart_delay: Duration,

    /// Optional ceiling on the restart delay
    #[serde(default, deserialize_with = "units::optional_duration")]
    pub max_restart_delay: Option<Duration>,

    /// Maximum number of restarts within `restart_window`
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// Window in which restarts are counted
    #[serde(default = "default_restart_window", deserialize_with = "units::duration")]
    pub restart_window: Duration,

    /// Continuous uptime after which the restart counter resets
    #[serde(default = "default_min_uptime", deserialize_with = "units::duration")]
    pub min_uptime: Duration,

    /// Resident memory in bytes that forces a restart
    #[serde(default, deserialize_with = "units::optional_size")]
    pub max_memory_restart: Option<u64>,

    /// How often resident memory is sampled
    #[serde(default = "default_memory_check_interval", deserialize_with = "units::duration")]
    pub memory_check_interval: Duration,

    /// Number of instances; must be 1
    #[serde(default = "default_instances")]
    pub instances: usize,

    #[serde(default = "default_exec_mode")]
    pub exec_mode: ExecMode,

    /// Accepted for compatibility, file watching is not supported
    #[serde(default)]
    pub watch: bool,

    #[serde(default)]
    pub ignore_watch: Vec<String>,

    /// strftime pattern for log line timestamps
    #[serde(default = "default_log_date_format")]
    pub log_date_format: String,

    #[serde(default)]
    pub error_file: Option<PathBuf>,

    #[serde(default)]
    pub out_file: Option<PathBuf>,

    /// Combined stdout + stderr log
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Prefix log lines with timestamps
    #[serde(default)]
    pub time: bool,

    /// Grace period between the stop signal and SIGKILL
    #[serde(default = "default_kill_timeout", deserialize_with = "units::duration")]
    pub kill_timeout: Duration,

    /// Graceful stop signal
    #[serde(default = "default_kill_signal")]
    pub kill_signal: String,

    /// Signal the whole process group of the child
    #[serde(default = "default_treekill")]
    pub treekill: bool,

    #[serde(default)]
    pub pid_file: Option<PathBuf>,
}

// Default value functions for serde
fn default_autorestart() -> bool {
    true
}

fn default_max_restarts() -> u32 {
    16
}

fn default_restart_window() -> Duration {
    Duration::from_secs(60)
}

fn default_min_uptime() -> Duration {
    Duration::from_millis(1000)
}

fn default_memory_check_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_instances() -> usize {
    1
}

fn default_exec_mode() -> ExecMode {
    ExecMode::Fork
}

fn default_log_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

fn default_kill_timeout() -> Duration {
    Duration::from_millis(1600)
}

fn default_kill_signal() -> String {
    "SIGINT".to_string()
}

fn default_treekill() -> bool {
    true
}

impl AppConfig {
    /// Load the app configuration from a file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<AppConfig> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| VigilError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let mut config = match extension {
            "toml" => Self::parse_toml(&contents)?,
            "json" => Self::parse_json(&contents)?,
            _ => {
                return Err(VigilError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        config.expand_env_vars();
        config.validate()?;

        Ok(config)
    }

    /// Parse TOML: either a single app table or an `[[apps]]` array with one entry
    pub fn parse_toml(contents: &str) -> Result<AppConfig> {
        let mut table: toml::Table = toml::from_str(contents)
            .map_err(|e| VigilError::InvalidConfig(format!("Failed to parse TOML: {}", e)))?;

        let value = match table.remove("apps") {
            Some(toml::Value::Array(apps)) if table.is_empty() => single_app(apps)?,
            Some(_) => {
                return Err(VigilError::InvalidConfig(
                    "'apps' must be the only top-level key and hold an array".to_string(),
                ))
            }
            None => toml::Value::Table(table),
        };

        value
            .try_into::<AppConfig>()
            .map_err(|e| VigilError::InvalidConfig(format!("Failed to parse TOML: {}", e)))
    }

    /// Parse JSON: either a single app object or `{"apps": [...]}` with one entry
    pub fn parse_json(contents: &str) -> Result<AppConfig> {
        let mut value: serde_json::Value = serde_json::from_str(contents)
            .map_err(|e| VigilError::InvalidConfig(format!("Failed to parse JSON: {}", e)))?;

        if let Some(object) = value.as_object_mut() {
            if let Some(apps) = object.remove("apps") {
                if !object.is_empty() {
                    return Err(VigilError::InvalidConfig(
                        "'apps' must be the only top-level key".to_string(),
                    ));
                }
                let apps = match apps {
                    serde_json::Value::Array(apps) => apps,
                    _ => {
                        return Err(VigilError::InvalidConfig(
                            "'apps' must be an array".to_string(),
                        ))
                    }
                };
                value = single_app(apps)?;
            }
        }

        serde_json::from_value(value)
            .map_err(|e| VigilError::InvalidConfig(format!("Failed to parse JSON: {}", e)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(VigilError::MissingConfigField("name".to_string()));
        }

        if self.script.as_os_str().is_empty() {
            return Err(VigilError::MissingConfigField("script".to_string()));
        }

        if self.instances != 1 {
            return Err(VigilError::ConfigValidationError(format!(
                "instances must be 1, got {}",
                self.instances
            )));
        }

        if self.exec_mode == ExecMode::Cluster {
            return Err(VigilError::ConfigValidationError(
                "exec_mode 'cluster' is not supported, use 'fork'".to_string(),
            ));
        }

        parse_signal(&self.kill_signal)
            .map_err(|e| VigilError::ConfigValidationError(format!("kill_signal: {}", e)))?;

        if StrftimeItems::new(&self.log_date_format).any(|item| matches!(item, Item::Error)) {
            return Err(VigilError::ConfigValidationError(format!(
                "Invalid log_date_format: {}",
                self.log_date_format
            )));
        }

        if self.restart_window.is_zero() {
            return Err(VigilError::ConfigValidationError(
                "restart_window must be greater than zero".to_string(),
            ));
        }

        if self.memory_check_interval.is_zero() {
            return Err(VigilError::ConfigValidationError(
                "memory_check_interval must be greater than zero".to_string(),
            ));
        }

        if let Some(ref cwd) = self.cwd {
            if !cwd.is_dir() {
                return Err(VigilError::ConfigValidationError(format!(
                    "Working directory does not exist or is not a directory: {}",
                    cwd.display()
                )));
            }
        }

        if self.watch {
            tracing::warn!(
                "'watch' is enabled for '{}' but file watching is not supported, ignoring",
                self.name
            );
        }

        Ok(())
    }

    /// Build the supervisor settings, resolving relative paths against `cwd`
    pub fn to_settings(&self) -> Result<SupervisorSettings> {
        // The child runs inside `base`, so every path handed to it must be absolute
        let base = match self.cwd {
            Some(ref cwd) => std::env::current_dir()?.join(cwd),
            None => std::env::current_dir()?,
        };

        let interpreter = self
            .interpreter
            .as_deref()
            .filter(|interp| !interp.is_empty() && *interp != "none")
            .map(PathBuf::from);

        let spec = ManagedProcessSpec {
            name: self.name.clone(),
            script: base.join(&self.script),
            interpreter,
            args: self.args.clone(),
            cwd: Some(base.clone()),
            env: self.env.clone(),
            pid_file: self.pid_file.as_ref().map(|p| base.join(p)),
        };

        let restart = RestartPolicy {
            enabled: self.autorestart,
            base_delay: self.restart_delay,
            backoff_increment: self.exp_backoff_restart_delay,
            max_delay: self.max_restart_delay,
            max_restarts: self.max_restarts,
            window: self.restart_window,
            min_uptime: self.min_uptime,
        };

        let limits = ResourceLimits::new(self.max_memory_restart, self.memory_check_interval);

        let logs = LogSettings {
            out_file: resolve_log_path(&base, &self.out_file, format!("{}-out.log", self.name)),
            error_file: resolve_log_path(
                &base,
                &self.error_file,
                format!("{}-error.log", self.name),
            ),
            combined_file: resolve_log_path(&base, &self.log_file, format!("{}.log", self.name)),
            time: self.time,
            date_format: self.log_date_format.clone(),
        };

        let shutdown = ShutdownSettings {
            kill_signal: parse_signal(&self.kill_signal)?,
            kill_timeout: self.kill_timeout,
            treekill: self.treekill,
        };

        Ok(SupervisorSettings {
            spec,
            restart,
            limits,
            logs,
            shutdown,
        })
    }

    /// Expand environment variables in paths, arguments and env values
    fn expand_env_vars(&mut self) {
        self.script = expand_env_in_path(&self.script);

        if let Some(ref cwd) = self.cwd {
            self.cwd = Some(expand_env_in_path(cwd));
        }

        for path in [
            &mut self.out_file,
            &mut self.error_file,
            &mut self.log_file,
            &mut self.pid_file,
        ]
        .into_iter()
        .flatten()
        {
            *path = expand_env_in_path(path);
        }

        self.args = self.args.iter().map(|arg| expand_env_in_string(arg)).collect();

        self.env = self
            .env
            .iter()
            .map(|(k, v)| (k.clone(), expand_env_in_string(v)))
            .collect();
    }
}

fn single_app<T>(mut apps: Vec<T>) -> Result<T> {
    if apps.len() != 1 {
        return Err(VigilError::ConfigValidationError(format!(
            "Exactly one app must be configured, found {}",
            apps.len()
        )));
    }
    Ok(apps.remove(0))
}

fn resolve_log_path(base: &Path, configured: &Option<PathBuf>, default_name: String) -> PathBuf {
    match configured {
        Some(path) => base.join(path),
        None => base.join("logs").join(default_name),
    }
}

/// Expand `$VAR` and `${VAR}`; unset variables are left untouched
fn expand_env_in_string(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(dollar) = rest.find('$') {
        result.push_str(&rest[..dollar]);
        let after = &rest[dollar + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        match std::env::var(name) {
            Ok(value) if !name.is_empty() => result.push_str(&value),
            _ => result.push_str(&rest[dollar..dollar + 1 + consumed]),
        }
        rest = &after[consumed..];
    }

    result.push_str(rest);
    result
}

fn expand_env_in_path(path: &Path) -> PathBuf {
    PathBuf::from(expand_env_in_string(&path.to_string_lossy()))
}
