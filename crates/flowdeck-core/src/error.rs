use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowdeckError {
    #[error("unknown step '{0}'; run 'flowdeck help' to list steps")]
    UnknownStep(String),

    #[error("step defined twice: {0}")]
    DuplicateStep(String),

    #[error("step '{step}' depends on unknown step '{prerequisite}'")]
    UnknownPrerequisite { step: String, prerequisite: String },

    #[error("dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("unknown parameter: {0}")]
    UnknownParam(String),

    #[error("invalid override '{0}': expected NAME=VALUE")]
    InvalidOverride(String),

    #[error("'{0}' not found on PATH")]
    ToolNotFound(String),

    #[error("{program} exited with status {code}")]
    CommandFailed { program: String, code: i32 },

    #[error("failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, FlowdeckError>;
