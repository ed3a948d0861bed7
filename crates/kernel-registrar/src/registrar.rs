//! The kernel registration pipeline.
//!
//! Registration runs as a fixed sequence of [`RegistrationStage`]s:
//!
//! ```text
//! Validate → Resolve → Render → Test → Install → Finalize
//! ```
//!
//! The first three stages are pure checks and produce a [`RegistrationPlan`]
//! without touching the filesystem or running anything. The remaining
//! stages run external processes through a [`ProcessRunner`]. Each stage has
//! exactly one way out on failure: an error is returned and nothing after it
//! runs.

use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::config::{KernelScope, RegistrarConfig};
use crate::descriptor::{KernelDescriptor, DESCRIPTOR_FILE_NAME};
use crate::error::{RegistrarError, RegistrarResult};
use crate::progress::{ProgressHandler, RegistrationPhase};
use crate::request::{validate_kernel_name, KernelRequest, RuntimeSelector};
use crate::runner::{CommandSpec, ProcessOutput, ProcessRunner};
use crate::wrapper::{
    venv_activate_script, StagedWrapper, WrapperBuilder, WrapperScript, WRAPPER_FILE_NAME,
};

/// Steps of a registration, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStage {
    Validate,
    Resolve,
    Render,
    Test,
    Install,
    Finalize,
}

impl fmt::Display for RegistrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationStage::Validate => write!(f, "validate"),
            RegistrationStage::Resolve => write!(f, "resolve"),
            RegistrationStage::Render => write!(f, "render"),
            RegistrationStage::Test => write!(f, "test"),
            RegistrationStage::Install => write!(f, "install"),
            RegistrationStage::Finalize => write!(f, "finalize"),
        }
    }
}

/// Everything needed to carry out a registration, computed without side effects.
#[derive(Debug, Clone)]
pub struct RegistrationPlan {
    pub name: String,
    pub scope: KernelScope,
    pub kernel_dir: PathBuf,
    /// Runtime selector with paths made absolute.
    pub runtime: Option<RuntimeSelector>,
    pub script: WrapperScript,
    pub install_command: CommandSpec,
}

impl RegistrationPlan {
    pub fn wrapper_path(&self) -> PathBuf {
        self.kernel_dir.join(WRAPPER_FILE_NAME)
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.kernel_dir.join(DESCRIPTOR_FILE_NAME)
    }
}

/// Outcome of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub kernel_dir: PathBuf,
    pub wrapper_path: PathBuf,
    pub descriptor_path: PathBuf,
    /// Command the user can run to remove the kernel again.
    pub remove_command: String,
}

/// Command removing a kernel from the Jupyter registry.
pub fn remove_command(name: &str) -> String {
    format!("jupyter-kernelspec remove {name}")
}

/// Registers kernels according to a [`RegistrarConfig`].
pub struct Registrar<R> {
    config: RegistrarConfig,
    runner: R,
}

impl<R: ProcessRunner> Registrar<R> {
    pub fn new(config: RegistrarConfig, runner: R) -> Self {
        Self { config, runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Register a kernel: plan it, then execute the plan.
    pub async fn register(
        &self,
        request: &KernelRequest,
        progress: &dyn ProgressHandler,
    ) -> RegistrarResult<Registration> {
        let plan = self.plan(request, progress)?;
        self.execute(plan, progress).await
    }

    /// Run the Validate, Resolve and Render stages.
    ///
    /// Performs no filesystem writes and starts no processes.
    pub fn plan(
        &self,
        request: &KernelRequest,
        progress: &dyn ProgressHandler,
    ) -> RegistrarResult<RegistrationPlan> {
        // Validate
        validate_kernel_name(&request.name)?;
        let runtime = request.selector.clone().resolve()?;
        debug!(
            "[registrar] Validated request for {} (runtime: {})",
            request.name,
            runtime.as_ref().map(RuntimeSelector::label).unwrap_or("none")
        );

        // Resolve
        let scope = self.config.scope(request.shared)?;
        if let KernelScope::Shared { project } = &scope {
            progress.on_progress(RegistrationPhase::SharedKernel {
                project: project.clone(),
            });
        }
        let kernel_dir = self.config.kernels_dir(&scope)?.join(&request.name);
        ensure_absent(&kernel_dir)?;
        let runtime = runtime.map(resolve_runtime_paths).transpose()?;
        for message in notices(&scope, runtime.as_ref()) {
            progress.on_progress(RegistrationPhase::Notice { message });
        }

        // Render
        let script = WrapperBuilder::new()
            .baseline_modules(&self.config.baseline_modules)
            .modules(&request.modules)
            .container_runtime(
                self.config.container_runtime.clone(),
                self.config.container_module.clone(),
            )
            .runtime(runtime.clone())
            .build();

        let install_command = self.install_command(&request.name, &scope);

        Ok(RegistrationPlan {
            name: request.name.clone(),
            scope,
            kernel_dir,
            runtime,
            script,
            install_command,
        })
    }

    /// Run the Test, Install and Finalize stages of a plan.
    pub async fn execute(
        &self,
        plan: RegistrationPlan,
        progress: &dyn ProgressHandler,
    ) -> RegistrarResult<Registration> {
        ensure_absent(&plan.kernel_dir)?;

        // Test
        let staged = plan
            .script
            .stage()
            .map_err(|e| RegistrarError::io(RegistrationStage::Test, e))?;
        self.test_wrapper(&staged, progress).await?;
        self.check_kernel_launcher(&staged, progress).await?;

        // The directory may have appeared while the wrapper was being tested.
        // It is not ours, so it is left alone.
        ensure_absent(&plan.kernel_dir)?;

        // Install + Finalize, removing the kernel directory if either fails.
        match self.install_and_finalize(&plan, staged, progress).await {
            Ok(registration) => {
                info!(
                    "[registrar] Registered kernel {} in {:?}",
                    registration.name, registration.kernel_dir
                );
                progress.on_progress(RegistrationPhase::Complete {
                    remove_command: registration.remove_command.clone(),
                });
                Ok(registration)
            }
            Err(e) => {
                cleanup_kernel_dir(&plan.kernel_dir, progress).await;
                Err(e)
            }
        }
    }

    fn install_command(&self, name: &str, scope: &KernelScope) -> CommandSpec {
        let command = CommandSpec::new(&self.config.jupyter_python)
            .args(["-m", "ipykernel", "install", "--name", name]);
        match scope {
            KernelScope::User => command.arg("--user"),
            KernelScope::Shared { project } => command.arg("--prefix").arg(
                self.config
                    .project_prefix(project)
                    .to_string_lossy()
                    .into_owned(),
            ),
        }
    }

    async fn run(&self, command: &CommandSpec) -> RegistrarResult<ProcessOutput> {
        self.runner
            .run(command)
            .await
            .map_err(|source| RegistrarError::Spawn {
                command: command.to_string(),
                source,
            })
    }

    async fn test_wrapper(
        &self,
        staged: &StagedWrapper,
        progress: &dyn ProgressHandler,
    ) -> RegistrarResult<()> {
        progress.on_progress(RegistrationPhase::TestingWrapper);
        let output = self
            .run(&CommandSpec::new(staged.path()).arg("--version"))
            .await?;
        if !output.success() {
            warn!(
                "[registrar] Wrapper test exited with {}",
                output.code_display()
            );
            return Err(RegistrarError::WrapperFailed {
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        debug!("[registrar] Wrapper reports {}", output.stdout.trim());
        Ok(())
    }

    async fn check_kernel_launcher(
        &self,
        staged: &StagedWrapper,
        progress: &dyn ProgressHandler,
    ) -> RegistrarResult<()> {
        let import_check = CommandSpec::new(staged.path()).args(["-c", "import ipykernel"]);

        progress.on_progress(RegistrationPhase::CheckingKernelLauncher);
        let output = self.run(&import_check).await?;
        if output.success() {
            return Ok(());
        }
        if !self.config.install_ipykernel {
            return Err(RegistrarError::KernelLauncherMissing {
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        progress.on_progress(RegistrationPhase::InstallingKernelLauncher);
        let install = self
            .run(&CommandSpec::new(staged.path()).args(["-m", "pip", "install", "ipykernel"]))
            .await?;
        if !install.success() {
            return Err(RegistrarError::KernelLauncherInstallFailed {
                stdout: install.stdout,
                stderr: install.stderr,
            });
        }

        let output = self.run(&import_check).await?;
        if !output.success() {
            return Err(RegistrarError::KernelLauncherMissing {
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        Ok(())
    }

    async fn install_and_finalize(
        &self,
        plan: &RegistrationPlan,
        staged: StagedWrapper,
        progress: &dyn ProgressHandler,
    ) -> RegistrarResult<Registration> {
        // Install
        progress.on_progress(RegistrationPhase::InstallingKernel {
            command: plan.install_command.to_string(),
        });
        let output = self.run(&plan.install_command).await?;
        if !output.success() {
            return Err(RegistrarError::InstallFailed {
                command: plan.install_command.to_string(),
                code: output.code_display(),
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        // Finalize
        let finalize_err = |e| RegistrarError::io(RegistrationStage::Finalize, e);
        tokio::fs::create_dir_all(&plan.kernel_dir)
            .await
            .map_err(finalize_err)?;

        let wrapper_path = plan.wrapper_path();
        staged.install_to(&wrapper_path).await.map_err(finalize_err)?;
        progress.on_progress(RegistrationPhase::WrapperInstalled {
            path: wrapper_path.to_string_lossy().into_owned(),
        });

        let descriptor_path = plan.descriptor_path();
        let descriptor = KernelDescriptor::for_wrapper(&wrapper_path, plan.name.clone());
        tokio::fs::write(&descriptor_path, descriptor.to_json()?)
            .await
            .map_err(finalize_err)?;
        progress.on_progress(RegistrationPhase::DescriptorWritten {
            path: descriptor_path.to_string_lossy().into_owned(),
        });

        Ok(Registration {
            name: plan.name.clone(),
            kernel_dir: plan.kernel_dir.clone(),
            wrapper_path,
            descriptor_path,
            remove_command: remove_command(&plan.name),
        })
    }
}

/// Check selector paths and make them absolute.
fn resolve_runtime_paths(runtime: RuntimeSelector) -> RegistrarResult<RuntimeSelector> {
    match runtime {
        RuntimeSelector::Venv(path) => {
            let venv = std::fs::canonicalize(&path)
                .ok()
                .filter(|p| p.is_dir())
                .ok_or(RegistrarError::VenvNotDirectory(path))?;
            if !venv_activate_script(&venv).exists() {
                return Err(RegistrarError::VenvMissingActivate(venv));
            }
            Ok(RuntimeSelector::Venv(venv))
        }
        RuntimeSelector::CondaPath(path) => std::fs::canonicalize(&path)
            .ok()
            .filter(|p| p.is_dir())
            .map(RuntimeSelector::CondaPath)
            .ok_or(RegistrarError::CondaPathNotDirectory(path)),
        RuntimeSelector::Container { image, args } => std::fs::canonicalize(&image)
            .ok()
            .filter(|p| p.is_file())
            .map(|image| RuntimeSelector::Container { image, args })
            .ok_or(RegistrarError::ContainerNotFile(image)),
        named @ RuntimeSelector::CondaName(_) => Ok(named),
    }
}

/// Advisory messages for the operator; none of them stop the registration.
fn notices(scope: &KernelScope, runtime: Option<&RuntimeSelector>) -> Vec<String> {
    let mut messages = Vec::new();
    if let (KernelScope::Shared { project }, Some(runtime)) = (scope, runtime) {
        let what = match runtime {
            RuntimeSelector::CondaPath(_) | RuntimeSelector::CondaName(_) => "conda environment",
            RuntimeSelector::Venv(_) => "virtual environment",
            RuntimeSelector::Container { .. } => "container image",
        };
        messages.push(format!(
            "Make sure your {what} is accessible to members of {project}"
        ));
    }
    if let Some(RuntimeSelector::Venv(_)) = runtime {
        messages.push(
            "Make sure you have specified the appropriate Python module(s) for your virtual environment"
                .to_string(),
        );
    }
    messages
}

fn ensure_absent(kernel_dir: &Path) -> RegistrarResult<()> {
    if kernel_dir.exists() {
        return Err(RegistrarError::KernelExists(kernel_dir.to_path_buf()));
    }
    Ok(())
}

async fn cleanup_kernel_dir(kernel_dir: &Path, progress: &dyn ProgressHandler) {
    if !kernel_dir.exists() {
        return;
    }
    match tokio::fs::remove_dir_all(kernel_dir).await {
        Ok(()) => progress.on_progress(RegistrationPhase::CleanedUp {
            path: kernel_dir.to_string_lossy().into_owned(),
        }),
        Err(e) => warn!(
            "[registrar] Failed to remove partial kernel directory {:?}: {}",
            kernel_dir, e
        ),
    }
}
