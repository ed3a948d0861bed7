//! Register Jupyter kernels that run inside HPC environment modules.
//!
//! A registered kernel consists of a bash wrapper script, which loads the
//! requested environment modules and optionally activates a Conda
//! environment, virtual environment or container, and a `kernel.json`
//! descriptor telling Jupyter to launch `ipykernel` through that wrapper.
//!
//! Before anything is installed the wrapper is run once to make sure it
//! produces a working interpreter with `ipykernel` available.
//!
//! ```ignore
//! use kernel_registrar::{KernelRequest, LogHandler, Registrar, RegistrarConfig, TokioRunner};
//!
//! let registrar = Registrar::new(RegistrarConfig::from_env(), TokioRunner);
//! let request = KernelRequest::new("tf-2.4").with_modules(["TensorFlow/2.4.1-gimkl-2020a-Python-3.8.2"]);
//! let registration = registrar.register(&request, &LogHandler).await?;
//! println!("{}", registration.remove_command);
//! ```

pub mod config;
pub mod descriptor;
pub mod error;
pub mod progress;
pub mod registrar;
pub mod request;
pub mod runner;
pub mod wrapper;

// Re-export commonly used items
pub use config::{KernelScope, RegistrarConfig};
pub use descriptor::KernelDescriptor;
pub use error::{ErrorKind, RegistrarError, RegistrarResult};
pub use progress::{LogHandler, ProgressHandler, RegistrationPhase};
pub use registrar::{Registrar, Registration, RegistrationPlan, RegistrationStage};
pub use request::{KernelRequest, RuntimeSelector, SelectorOptions};
pub use runner::{CommandSpec, ProcessOutput, ProcessRunner, TokioRunner};
pub use wrapper::{WrapperBuilder, WrapperScript};
