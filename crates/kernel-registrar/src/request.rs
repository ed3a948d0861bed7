//! Kernel registration requests and runtime selection.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{RegistrarError, RegistrarResult};

/// How the kernel's Python interpreter is provided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuntimeSelector {
    /// Conda environment given by its prefix directory.
    CondaPath(PathBuf),
    /// Conda environment given by name.
    CondaName(String),
    /// Python virtual environment directory.
    Venv(PathBuf),
    /// Container image run through the container runtime.
    Container {
        image: PathBuf,
        /// Extra arguments passed verbatim to `<runtime> exec`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<String>,
    },
}

impl RuntimeSelector {
    /// Short label used in progress output.
    pub fn label(&self) -> &'static str {
        match self {
            RuntimeSelector::CondaPath(_) | RuntimeSelector::CondaName(_) => "conda",
            RuntimeSelector::Venv(_) => "venv",
            RuntimeSelector::Container { .. } => "container",
        }
    }
}

/// Raw, possibly conflicting runtime options as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct SelectorOptions {
    pub conda_path: Option<PathBuf>,
    pub conda_name: Option<String>,
    pub venv: Option<PathBuf>,
    pub container: Option<PathBuf>,
    pub container_args: Option<String>,
}

impl SelectorOptions {
    /// Collapse the options into at most one [`RuntimeSelector`].
    ///
    /// Fails on the first pair of options that are both present.
    pub fn resolve(self) -> RegistrarResult<Option<RuntimeSelector>> {
        let SelectorOptions {
            conda_path,
            conda_name,
            venv,
            container,
            container_args,
        } = self;

        if container_args.is_some() && container.is_none() {
            return Err(RegistrarError::ContainerArgsWithoutContainer);
        }

        let mut present: Vec<(&'static str, RuntimeSelector)> = Vec::new();
        if let Some(path) = conda_path {
            present.push(("conda-path", RuntimeSelector::CondaPath(path)));
        }
        if let Some(name) = conda_name {
            present.push(("conda-name", RuntimeSelector::CondaName(name)));
        }
        if let Some(path) = venv {
            present.push(("venv", RuntimeSelector::Venv(path)));
        }
        if let Some(image) = container {
            present.push((
                "container",
                RuntimeSelector::Container {
                    image,
                    args: container_args,
                },
            ));
        }

        if present.len() > 1 {
            return Err(RegistrarError::ConflictingSelectors {
                first: present[0].0,
                second: present[1].0,
            });
        }

        Ok(present.pop().map(|(_, selector)| selector))
    }
}

/// A request to register one kernel.
#[derive(Debug, Clone)]
pub struct KernelRequest {
    pub name: String,
    pub modules: Vec<String>,
    pub selector: SelectorOptions,
    pub shared: bool,
}

impl KernelRequest {
    /// Create a private kernel request with no modules and no runtime selector.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modules: Vec::new(),
            selector: SelectorOptions::default(),
            shared: false,
        }
    }

    pub fn with_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modules = modules.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_selector(mut self, selector: SelectorOptions) -> Self {
        self.selector = selector;
        self
    }

    pub fn shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }
}

/// Check that `name` can be used as a kernelspec directory name.
///
/// `ipykernel install` stores kernels under the lowercased name, so names
/// with upper-case letters are rejected rather than silently renamed.
pub fn validate_kernel_name(name: &str) -> RegistrarResult<()> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if name.is_empty() || name == "." || name == ".." || !valid_chars {
        return Err(RegistrarError::InvalidName(name.to_string()));
    }
    if name.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(RegistrarError::UppercaseName(name.to_string()));
    }
    Ok(())
}
