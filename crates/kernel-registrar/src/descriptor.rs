//! The `kernel.json` descriptor pointing Jupyter at the wrapper script.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// File name of the descriptor inside the kernel directory.
pub const DESCRIPTOR_FILE_NAME: &str = "kernel.json";

/// Placeholder Jupyter substitutes with the connection file path.
pub const CONNECTION_FILE_PLACEHOLDER: &str = "{connection_file}";

/// A Jupyter kernelspec descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelDescriptor {
    pub argv: Vec<String>,
    pub display_name: String,
    pub language: String,
}

impl KernelDescriptor {
    /// Descriptor launching `ipykernel_launcher` through `wrapper`.
    pub fn for_wrapper(wrapper: &Path, display_name: impl Into<String>) -> Self {
        Self {
            argv: vec![
                wrapper.to_string_lossy().into_owned(),
                "-m".to_string(),
                "ipykernel_launcher".to_string(),
                "-f".to_string(),
                CONNECTION_FILE_PLACEHOLDER.to_string(),
            ],
            display_name: display_name.into(),
            language: "python".to_string(),
        }
    }

    /// Serialize with four-space indentation, matching Jupyter's own files.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)?;
        // serde_json only ever emits UTF-8.
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
