//! Registrar configuration.
//!
//! All ambient lookups (home directory, project account) happen in
//! [`RegistrarConfig::from_env`]; the registrar itself only reads the
//! values stored here.

use std::path::{Path, PathBuf};

use crate::error::{RegistrarError, RegistrarResult};

/// Environment variable holding the Slurm project account.
pub const PROJECT_ENV_VAR: &str = "SLURM_JOB_ACCOUNT";

/// Default root under which project directories live.
pub const DEFAULT_PROJECT_ROOT: &str = "/nesi/project";

/// Modules loaded by every wrapper, even on hosts where they are not defaults.
pub const DEFAULT_BASELINE_MODULES: &[&str] = &["slurm", "NeSI"];

/// Where a kernel gets installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelScope {
    /// Current user's Jupyter data directory.
    User,
    /// Project-wide Jupyter prefix, visible to all project members.
    Shared { project: String },
}

/// Configuration for a [`Registrar`](crate::Registrar).
#[derive(Debug, Clone)]
pub struct RegistrarConfig {
    /// Home directory of the invoking user.
    pub home_dir: Option<PathBuf>,
    /// Project account used for shared kernels.
    pub project: Option<String>,
    /// Root directory containing one directory per project.
    pub project_root: PathBuf,
    /// Modules loaded before any caller-supplied module.
    pub baseline_modules: Vec<String>,
    /// Interpreter used to run `ipykernel install`.
    pub jupyter_python: PathBuf,
    /// Container runtime executable invoked inside the wrapper.
    pub container_runtime: String,
    /// Module providing the container runtime.
    pub container_module: String,
    /// Run `pip install ipykernel` through the wrapper when it is missing.
    pub install_ipykernel: bool,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            home_dir: dirs::home_dir(),
            project: None,
            project_root: PathBuf::from(DEFAULT_PROJECT_ROOT),
            baseline_modules: DEFAULT_BASELINE_MODULES
                .iter()
                .map(|m| m.to_string())
                .collect(),
            jupyter_python: PathBuf::from("python"),
            container_runtime: "apptainer".to_string(),
            container_module: "Apptainer".to_string(),
            install_ipykernel: true,
        }
    }
}

impl RegistrarConfig {
    /// Build a configuration from the process environment.
    pub fn from_env() -> Self {
        let project = std::env::var(PROJECT_ENV_VAR)
            .ok()
            .filter(|value| !value.trim().is_empty());
        Self {
            project,
            ..Default::default()
        }
    }

    pub fn with_home_dir(mut self, home_dir: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(home_dir.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_project_root(mut self, project_root: impl Into<PathBuf>) -> Self {
        self.project_root = project_root.into();
        self
    }

    pub fn with_baseline_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.baseline_modules = modules.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_install_ipykernel(mut self, install: bool) -> Self {
        self.install_ipykernel = install;
        self
    }

    /// Resolve the install scope for a request.
    pub fn scope(&self, shared: bool) -> RegistrarResult<KernelScope> {
        if !shared {
            return Ok(KernelScope::User);
        }
        self.project
            .clone()
            .map(|project| KernelScope::Shared { project })
            .ok_or(RegistrarError::MissingProject)
    }

    /// Jupyter prefix for a shared project (`--prefix` of `ipykernel install`).
    pub fn project_prefix(&self, project: &str) -> PathBuf {
        self.project_root.join(project).join(".jupyter")
    }

    /// Directory holding all kernelspecs for a scope.
    pub fn kernels_dir(&self, scope: &KernelScope) -> RegistrarResult<PathBuf> {
        match scope {
            KernelScope::User => {
                let home = self.home_dir.as_deref().ok_or(RegistrarError::MissingHome)?;
                Ok(kernels_under(&home.join(".local")))
            }
            KernelScope::Shared { project } => Ok(kernels_under(&self.project_prefix(project))),
        }
    }
}

fn kernels_under(prefix: &Path) -> PathBuf {
    prefix.join("share").join("jupyter").join("kernels")
}
