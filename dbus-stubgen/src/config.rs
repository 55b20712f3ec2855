//! Configuration types for `dbus-stubgen.toml`.
//!
//! The file carries both the output settings and the introspection data:
//!
//! ```toml
//! [output]
//! prefix = "my"
//! mode = "object"
//! source = "test.c"
//!
//! [[interface]]
//! name = "com.netsplit.Nih.Test"
//!
//! [[interface.method]]
//! name = "Method"
//! arg = [
//!     { name = "str", type = "s", direction = "in" },
//!     { name = "output", type = "as", direction = "out" },
//! ]
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::model::{Access, Direction, Mode};

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub output: OutputConfig,
    #[serde(default)]
    pub interface: Vec<InterfaceDecl>,
}

/// Output file settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Prefix of every generated C symbol.
    pub prefix: String,
    #[serde(default = "default_mode")]
    pub mode: Mode,
    /// Generated C source (e.g. `test.c`).
    #[serde(default = "default_source_file")]
    pub source: PathBuf,
    /// Generated header; defaults to the source with a `.h` extension.
    #[serde(default)]
    pub header: Option<PathBuf>,
}

fn default_mode() -> Mode {
    Mode::Object
}

fn default_source_file() -> PathBuf {
    PathBuf::from("output.c")
}

impl OutputConfig {
    pub fn header_file(&self) -> PathBuf {
        self.header
            .clone()
            .unwrap_or_else(|| self.source.with_extension("h"))
    }
}

/// An `<annotation name=".." value=".."/>` element.
#[derive(Debug, Clone, Deserialize)]
pub struct AnnotationDecl {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceDecl {
    pub name: String,
    /// Symbol inserted into public names; none by default.
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub annotation: Vec<AnnotationDecl>,
    #[serde(default)]
    pub method: Vec<MethodDecl>,
    #[serde(default)]
    pub signal: Vec<SignalDecl>,
    #[serde(default)]
    pub property: Vec<PropertyDecl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub annotation: Vec<AnnotationDecl>,
    #[serde(default)]
    pub arg: Vec<ArgDecl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignalDecl {
    pub name: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub annotation: Vec<AnnotationDecl>,
    #[serde(default)]
    pub arg: Vec<ArgDecl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PropertyDecl {
    pub name: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(rename = "type")]
    pub ty: String,
    pub access: Access,
    #[serde(default)]
    pub annotation: Vec<AnnotationDecl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArgDecl {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub ty: String,
    /// Methods default to `in`; signal arguments are always `out`.
    #[serde(default)]
    pub direction: Option<Direction>,
}

/// Load and parse a `dbus-stubgen.toml` configuration file.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {}", path.display(), e))?;
    parse_config(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {}", path.display(), e))
}

/// Parse configuration text.
pub fn parse_config(content: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(content)
}
