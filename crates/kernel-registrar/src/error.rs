//! Error taxonomy for kernel registration.

use std::path::PathBuf;

use crate::registrar::RegistrationStage;

/// Result type for registrar operations.
pub type RegistrarResult<T> = Result<T, RegistrarError>;

/// Broad category of a registration failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad options or paths, detected before anything is touched.
    Usage,
    /// The wrapper or the kernel environment does not work.
    Environment,
    /// An external tool or the filesystem failed during install.
    External,
}

/// Errors that can occur while registering a kernel.
#[derive(Debug, thiserror::Error)]
pub enum RegistrarError {
    #[error("invalid kernel name {0:?}: use only letters, digits, '.', '_' and '-'")]
    InvalidName(String),

    #[error("invalid kernel name {0:?}: Jupyter lowercases kernel names, use {lower:?} instead", lower = .0.to_lowercase())]
    UppercaseName(String),

    #[error("--{first} and --{second} options are not compatible")]
    ConflictingSelectors {
        first: &'static str,
        second: &'static str,
    },

    #[error("--container-args requires --container")]
    ContainerArgsWithoutContainer,

    #[error("cannot determine project to share kernel with, try running within a Jupyter terminal")]
    MissingProject,

    #[error("cannot determine home directory")]
    MissingHome,

    #[error("Kernel already exists: {0}")]
    KernelExists(PathBuf),

    #[error("--venv ({0}) should point to a virtual environment directory")]
    VenvNotDirectory(PathBuf),

    #[error("--venv ({0}) does not appear to be a virtual environment (cannot find bin/activate)")]
    VenvMissingActivate(PathBuf),

    #[error("--conda-path ({0}) should point to a Conda environment directory")]
    CondaPathNotDirectory(PathBuf),

    #[error("--container ({0}) should point to a container image file")]
    ContainerNotFile(PathBuf),

    #[error("unable to create wrapper script, check modules and other options are correct")]
    WrapperFailed { stdout: String, stderr: String },

    #[error("ipykernel is not available in the kernel environment")]
    KernelLauncherMissing { stdout: String, stderr: String },

    #[error("ipykernel could not be installed in the kernel environment")]
    KernelLauncherInstallFailed { stdout: String, stderr: String },

    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("kernel install command failed ({command}): exit status {code}")]
    InstallFailed {
        command: String,
        code: String,
        stdout: String,
        stderr: String,
    },

    #[error("IO error during {stage}: {source}")]
    Io {
        stage: RegistrationStage,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize kernel descriptor: {0}")]
    Descriptor(#[from] serde_json::Error),
}

impl RegistrarError {
    /// Category used by callers to pick an exit code.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistrarError::InvalidName(_)
            | RegistrarError::UppercaseName(_)
            | RegistrarError::ConflictingSelectors { .. }
            | RegistrarError::ContainerArgsWithoutContainer
            | RegistrarError::MissingProject
            | RegistrarError::MissingHome
            | RegistrarError::KernelExists(_)
            | RegistrarError::VenvNotDirectory(_)
            | RegistrarError::VenvMissingActivate(_)
            | RegistrarError::CondaPathNotDirectory(_)
            | RegistrarError::ContainerNotFile(_) => ErrorKind::Usage,
            RegistrarError::WrapperFailed { .. }
            | RegistrarError::KernelLauncherMissing { .. }
            | RegistrarError::KernelLauncherInstallFailed { .. } => ErrorKind::Environment,
            RegistrarError::Spawn { .. }
            | RegistrarError::InstallFailed { .. }
            | RegistrarError::Io { .. }
            | RegistrarError::Descriptor(_) => ErrorKind::External,
        }
    }

    /// Captured stdout/stderr of the failing subprocess, if any.
    pub fn captured_output(&self) -> Option<(&str, &str)> {
        match self {
            RegistrarError::WrapperFailed { stdout, stderr }
            | RegistrarError::KernelLauncherMissing { stdout, stderr }
            | RegistrarError::KernelLauncherInstallFailed { stdout, stderr }
            | RegistrarError::InstallFailed { stdout, stderr, .. } => {
                Some((stdout.as_str(), stderr.as_str()))
            }
            _ => None,
        }
    }

    pub(crate) fn io(stage: RegistrationStage, source: std::io::Error) -> Self {
        RegistrarError::Io { stage, source }
    }
}
