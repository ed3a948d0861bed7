//! Wrapper script generation.
//!
//! A wrapper is a bash script that prepares the module environment, activates
//! the selected runtime and then execs Python with the kernel's arguments.
//! It is assembled from an ordered list of [`ScriptSection`]s rather than a
//! format template, so each runtime only contributes its own block.

use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use log::debug;

use crate::request::RuntimeSelector;

/// Mode applied to wrapper scripts: owner and group may read and run them.
pub const WRAPPER_MODE: u32 = 0o770;

/// File name of the wrapper inside the kernel directory.
pub const WRAPPER_FILE_NAME: &str = "wrapper.bash";

/// How the final line of the wrapper starts the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launch {
    /// `python` from whatever environment the previous sections set up.
    Python,
    /// `python` inside a container image.
    Container {
        runtime: String,
        args: Option<String>,
        image: PathBuf,
    },
}

/// One logical block of a wrapper script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSection {
    Preamble,
    ResetEnvironment,
    BaselineModules(Vec<String>),
    UserModules(Vec<String>),
    Conda { env: String },
    Venv { activate_script: PathBuf },
    ContainerRuntime { module: String },
    Launch(Launch),
}

impl ScriptSection {
    /// Whether this section activates a runtime environment.
    pub fn is_activation(&self) -> bool {
        matches!(
            self,
            ScriptSection::Conda { .. }
                | ScriptSection::Venv { .. }
                | ScriptSection::ContainerRuntime { .. }
        )
    }

    fn render(&self) -> String {
        match self {
            ScriptSection::Preamble => "#!/usr/bin/env bash\n\nset -e\n".to_string(),
            ScriptSection::ResetEnvironment => {
                "# start with a clean environment\nmodule purge\n".to_string()
            }
            ScriptSection::BaselineModules(modules) => format!(
                "# load required modules\nmodule load {}\n",
                join_quoted(modules)
            ),
            ScriptSection::UserModules(modules) => format!(
                "# load kernel modules\nmodule load {}\n",
                join_quoted(modules)
            ),
            ScriptSection::Conda { env } => format!(
                concat!(
                    "# load conda module on Mahuika or Maui\n",
                    "if hostname | grep -q \"maui\"; then\n",
                    "    module load Anaconda3\n",
                    "else\n",
                    "    module load Miniconda3\n",
                    "fi\n",
                    "\n",
                    "# activate conda environment\n",
                    "source $(conda info --base)/etc/profile.d/conda.sh\n",
                    "conda deactivate  # enforce base environment to be unloaded\n",
                    "conda activate {}\n",
                ),
                shell_quote(env)
            ),
            ScriptSection::Venv { activate_script } => format!(
                "# activate virtual environment\nsource {}\n",
                shell_quote(&activate_script.to_string_lossy())
            ),
            ScriptSection::ContainerRuntime { module } => format!(
                "# load the container runtime\nmodule load {}\n",
                shell_quote(module)
            ),
            ScriptSection::Launch(Launch::Python) => {
                "# run the kernel\nexec python \"$@\"\n".to_string()
            }
            ScriptSection::Launch(Launch::Container {
                runtime,
                args,
                image,
            }) => {
                let mut line = format!("exec {} exec", shell_quote(runtime));
                if let Some(args) = args.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
                    // Unquoted: the shell splits these into separate words.
                    line.push(' ');
                    line.push_str(args);
                }
                format!(
                    "# run the kernel inside the container\n{} {} python \"$@\"\n",
                    line,
                    shell_quote(&image.to_string_lossy())
                )
            }
        }
    }
}

/// Builder for [`WrapperScript`].
#[derive(Debug, Clone, Default)]
pub struct WrapperBuilder {
    baseline_modules: Vec<String>,
    modules: Vec<String>,
    runtime: Option<RuntimeSelector>,
    container_runtime: String,
    container_module: String,
}

impl WrapperBuilder {
    pub fn new() -> Self {
        Self {
            container_runtime: "apptainer".to_string(),
            container_module: "Apptainer".to_string(),
            ..Default::default()
        }
    }

    pub fn baseline_modules(mut self, modules: &[String]) -> Self {
        self.baseline_modules = modules.to_vec();
        self
    }

    pub fn modules(mut self, modules: &[String]) -> Self {
        self.modules = modules.to_vec();
        self
    }

    pub fn runtime(mut self, runtime: Option<RuntimeSelector>) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn container_runtime(
        mut self,
        runtime: impl Into<String>,
        module: impl Into<String>,
    ) -> Self {
        self.container_runtime = runtime.into();
        self.container_module = module.into();
        self
    }

    pub fn build(self) -> WrapperScript {
        let mut sections = vec![ScriptSection::Preamble, ScriptSection::ResetEnvironment];

        if !self.baseline_modules.is_empty() {
            sections.push(ScriptSection::BaselineModules(self.baseline_modules));
        }
        if !self.modules.is_empty() {
            sections.push(ScriptSection::UserModules(self.modules));
        }

        let launch = match self.runtime {
            None => Launch::Python,
            Some(RuntimeSelector::CondaPath(path)) => {
                sections.push(ScriptSection::Conda {
                    env: path.to_string_lossy().into_owned(),
                });
                Launch::Python
            }
            Some(RuntimeSelector::CondaName(name)) => {
                sections.push(ScriptSection::Conda { env: name });
                Launch::Python
            }
            Some(RuntimeSelector::Venv(path)) => {
                sections.push(ScriptSection::Venv {
                    activate_script: venv_activate_script(&path),
                });
                Launch::Python
            }
            Some(RuntimeSelector::Container { image, args }) => {
                sections.push(ScriptSection::ContainerRuntime {
                    module: self.container_module,
                });
                Launch::Container {
                    runtime: self.container_runtime,
                    args,
                    image,
                }
            }
        };
        sections.push(ScriptSection::Launch(launch));

        WrapperScript { sections }
    }
}

/// Path of the activation script inside a virtual environment.
pub fn venv_activate_script(venv: &Path) -> PathBuf {
    venv.join("bin").join("activate")
}

/// A rendered-on-demand wrapper script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperScript {
    sections: Vec<ScriptSection>,
}

impl WrapperScript {
    pub fn sections(&self) -> &[ScriptSection] {
        &self.sections
    }

    /// Whether any section activates a runtime environment.
    pub fn has_activation(&self) -> bool {
        self.sections.iter().any(ScriptSection::is_activation)
    }

    /// Render the full script text.
    pub fn render(&self) -> String {
        self.sections
            .iter()
            .map(ScriptSection::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Write the script to a temporary executable file.
    ///
    /// The file is deleted when the returned [`StagedWrapper`] is dropped.
    pub fn stage(&self) -> std::io::Result<StagedWrapper> {
        let mut file = tempfile::Builder::new()
            .prefix("kernel-wrapper-")
            .suffix(".bash")
            .tempfile()?;
        file.write_all(self.render().as_bytes())?;
        file.flush()?;

        // Closing the handle before running the script avoids ETXTBSY.
        let path = file.into_temp_path();
        #[cfg(unix)]
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(WRAPPER_MODE))?;

        debug!("[wrapper] Staged wrapper script at {:?}", &*path);
        Ok(StagedWrapper { path })
    }
}

/// A wrapper script written to a temporary location.
#[derive(Debug)]
pub struct StagedWrapper {
    path: tempfile::TempPath,
}

impl StagedWrapper {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the wrapper to `dest` and make it executable.
    ///
    /// Copies rather than renames because the temporary directory is usually
    /// on a different filesystem from the kernel directory.
    pub async fn install_to(self, dest: &Path) -> std::io::Result<()> {
        tokio::fs::copy(&*self.path, dest).await?;
        #[cfg(unix)]
        tokio::fs::set_permissions(dest, std::fs::Permissions::from_mode(WRAPPER_MODE)).await?;
        self.path.close()?;
        debug!("[wrapper] Installed wrapper script at {:?}", dest);
        Ok(())
    }
}

fn join_quoted(words: &[String]) -> String {
    words
        .iter()
        .map(|w| shell_quote(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quote a word for bash, leaving common path and module characters bare.
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+=:,@%".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
