use thiserror::Error;

/// Main error type for the vigil supervisor
#[derive(Debug, Error)]
pub enum VigilError {
    // Child lifecycle errors
    #[error("Failed to spawn process: {0}")]
    SpawnFailure(String),

    #[error("Process {0} exited unexpectedly: {1}")]
    UnexpectedExit(String, String),

    #[error("Memory limit exceeded for process {name}: {sample} bytes (limit: {limit} bytes)")]
    MemoryLimitExceeded { name: String, sample: u64, limit: u64 },

    #[error("Restart budget exhausted for {name}: {restarts} restarts within {window_secs}s")]
    RestartBudgetExhausted {
        name: String,
        restarts: u32,
        window_secs: u64,
    },

    #[error("Process {0} ignored the graceful signal for {1}ms, escalating to SIGKILL")]
    ShutdownTimeout(String, u64),

    #[error("Signal error: {0}")]
    SignalError(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Missing required configuration field: {0}")]
    MissingConfigField(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // Log-related errors
    #[error("Log error: {0}")]
    LogError(String),

    #[error("Failed to open log file: {0}")]
    LogFileError(String),

    #[error("Supervisor is no longer running")]
    SupervisorGone,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for vigil operations
pub type Result<T> = std::result::Result<T, VigilError>;
