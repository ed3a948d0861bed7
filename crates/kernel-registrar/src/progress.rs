//! Progress reporting for kernel registration.
//!
//! Provides [`RegistrationPhase`] events covering each step of a registration
//! and a [`ProgressHandler`] trait that consumers implement to route events
//! to the terminal, logs, or a test recorder.

use serde::{Deserialize, Serialize};

/// Progress phases during kernel registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RegistrationPhase {
    /// Shared kernel target resolved.
    SharedKernel { project: String },
    /// Advisory message that does not stop the registration.
    Notice { message: String },
    /// Running the wrapper with `--version`.
    TestingWrapper,
    /// Checking that `ipykernel` imports in the kernel environment.
    CheckingKernelLauncher,
    /// Installing `ipykernel` through the wrapper.
    InstallingKernelLauncher,
    /// Running the external kernel install command.
    InstallingKernel { command: String },
    /// Wrapper moved into the kernel directory.
    WrapperInstalled { path: String },
    /// Descriptor written.
    DescriptorWritten { path: String },
    /// Registration finished.
    Complete { remove_command: String },
    /// Partially created kernel directory removed after a failure.
    CleanedUp { path: String },
}

/// Trait for receiving registration progress events.
pub trait ProgressHandler {
    /// Called for each phase, in order.
    fn on_progress(&self, phase: RegistrationPhase);
}

/// Log-only progress handler.
///
/// Writes progress phases to the `log` crate at info level.
pub struct LogHandler;

impl ProgressHandler for LogHandler {
    fn on_progress(&self, phase: RegistrationPhase) {
        match &phase {
            RegistrationPhase::SharedKernel { project } => {
                log::info!("[registrar] Creating shared kernel for {project}");
            }
            RegistrationPhase::Notice { message } => {
                log::warn!("[registrar] {message}");
            }
            RegistrationPhase::TestingWrapper => {
                log::info!("[registrar] Testing wrapper script");
            }
            RegistrationPhase::CheckingKernelLauncher => {
                log::info!("[registrar] Checking ipykernel in the kernel environment");
            }
            RegistrationPhase::InstallingKernelLauncher => {
                log::info!("[registrar] Installing ipykernel in the kernel environment");
            }
            RegistrationPhase::InstallingKernel { command } => {
                log::info!("[registrar] Installing kernel: {command}");
            }
            RegistrationPhase::WrapperInstalled { path } => {
                log::info!("[registrar] Added wrapper script in {path}");
            }
            RegistrationPhase::DescriptorWritten { path } => {
                log::info!("[registrar] Updated kernel JSON file {path}");
            }
            RegistrationPhase::Complete { remove_command } => {
                log::info!("[registrar] Done, remove with: {remove_command}");
            }
            RegistrationPhase::CleanedUp { path } => {
                log::warn!("[registrar] Removed partially created kernel directory {path}");
            }
        }
    }
}
