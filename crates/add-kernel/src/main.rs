//! `add-kernel`: register a Jupyter kernel wrapped with environment modules.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgGroup, Parser};
use kernel_registrar::{
    ErrorKind, KernelRequest, LogHandler, ProgressHandler, Registrar, RegistrarConfig,
    RegistrarError, RegistrationPhase, SelectorOptions, TokioRunner,
};
use log::debug;

#[derive(Parser, Debug)]
#[command(name = "add-kernel", author, version)]
#[command(about = "Register a new Jupyter kernel, with a wrapper script to load environment modules")]
#[command(group(
    ArgGroup::new("runtime")
        .args(["conda_path", "conda_name", "venv", "container"])
        .multiple(false)
))]
struct Cli {
    /// Jupyter kernel name
    kernel_name: String,

    /// Environment module(s) to load before running the kernel
    modules: Vec<String>,

    /// Path to a Conda environment
    #[arg(long)]
    conda_path: Option<PathBuf>,

    /// Name of a Conda environment
    #[arg(long)]
    conda_name: Option<String>,

    /// Path to a Python virtual environment
    #[arg(long)]
    venv: Option<PathBuf>,

    /// Path to a container image providing Python
    #[arg(long)]
    container: Option<PathBuf>,

    /// Extra arguments for the container runtime (e.g. "--nv -B /nesi")
    #[arg(long, requires = "container", allow_hyphen_values = true)]
    container_args: Option<String>,

    /// Share the kernel with other members of your project
    #[arg(long)]
    shared: bool,

    /// Project to share the kernel with (default: $SLURM_JOB_ACCOUNT)
    #[arg(long, requires = "shared")]
    project: Option<String>,

    /// Do not try to install ipykernel when it is missing
    #[arg(long)]
    no_install_ipykernel: bool,

    /// Print the wrapper script and target paths without installing anything
    #[arg(long)]
    dry_run: bool,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Cli {
    fn config(&self) -> RegistrarConfig {
        let mut config =
            RegistrarConfig::from_env().with_install_ipykernel(!self.no_install_ipykernel);
        if let Some(project) = &self.project {
            config = config.with_project(project.clone());
        }
        config
    }

    fn request(&self) -> KernelRequest {
        KernelRequest::new(self.kernel_name.clone())
            .with_modules(self.modules.iter().cloned())
            .with_selector(SelectorOptions {
                conda_path: self.conda_path.clone(),
                conda_name: self.conda_name.clone(),
                venv: self.venv.clone(),
                container: self.container.clone(),
                container_args: self.container_args.clone(),
            })
            .shared(self.shared)
    }
}

/// Prints progress for a human at the terminal and mirrors it to the log.
struct TerminalHandler;

impl ProgressHandler for TerminalHandler {
    fn on_progress(&self, phase: RegistrationPhase) {
        match &phase {
            RegistrationPhase::SharedKernel { project } => {
                println!("Creating shared kernel for {project}");
            }
            RegistrationPhase::Notice { message } => println!("{message}"),
            RegistrationPhase::TestingWrapper => println!("Testing wrapper script"),
            RegistrationPhase::CheckingKernelLauncher => {
                println!("Checking ipykernel package in the kernel environment");
            }
            RegistrationPhase::InstallingKernelLauncher => {
                println!("Installing ipykernel package in the kernel environment");
            }
            RegistrationPhase::InstallingKernel { command } => {
                println!("Installing kernel: {command}");
            }
            RegistrationPhase::WrapperInstalled { path } => {
                println!("Added wrapper script in {path}");
            }
            RegistrationPhase::DescriptorWritten { path } => {
                println!("Updated kernel JSON file {path}");
            }
            RegistrationPhase::Complete { remove_command } => {
                println!("\nUse the following command to remove the kernel:");
                println!("\n    {remove_command}\n");
            }
            RegistrationPhase::CleanedUp { path } => {
                eprintln!("Removed partially created kernel directory {path}");
            }
        }
        LogHandler.on_progress(phase);
    }
}

fn report_error(err: &RegistrarError) -> ExitCode {
    if let Some((stdout, stderr)) = err.captured_output() {
        if !stdout.trim().is_empty() {
            eprintln!("{}", stdout.trim_end());
        }
        if !stderr.trim().is_empty() {
            eprintln!("{}", stderr.trim_end());
        }
    }
    eprintln!("ERROR: {err}");
    match err.kind() {
        ErrorKind::Usage => ExitCode::from(2),
        ErrorKind::Environment | ErrorKind::External => ExitCode::FAILURE,
    }
}

async fn run(cli: Cli) -> Result<(), RegistrarError> {
    let registrar = Registrar::new(cli.config(), TokioRunner);
    let request = cli.request();
    debug!("Request: {:?}", request);

    if cli.dry_run {
        let plan = registrar.plan(&request, &TerminalHandler)?;
        println!("Kernel directory: {}", plan.kernel_dir.display());
        println!("Wrapper script: {}", plan.wrapper_path().display());
        println!("Kernel JSON file: {}", plan.descriptor_path().display());
        println!("Install command: {}", plan.install_command);
        println!();
        print!("{}", plan.script.render());
        return Ok(());
    }

    registrar.register(&request, &TerminalHandler).await?;
    Ok(())
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    match rt.block_on(run(cli)) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => Ok(report_error(&e)),
    }
}
