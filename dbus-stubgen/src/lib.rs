//! dbus-stubgen: D-Bus interface declarations to C marshalling stubs.
//!
//! Reads a TOML declaration of an object's interfaces and emits a C source
//! file and header that marshal and demarshal D-Bus messages against the
//! libnih D-Bus runtime, either for exported objects or for proxies.
//!
//! # Quick start
//!
//! Generate the files from a config (suitable for `build.rs`):
//!
//! ```no_run
//! use std::path::Path;
//!
//! // Reads config TOML, generates stubs, writes the .c and .h files.
//! dbus_stubgen::run(Path::new("dbus-stubgen.toml"), None).unwrap();
//! ```
//!
//! Or get the generated text without writing to disk:
//!
//! ```no_run
//! use std::path::Path;
//!
//! let files = dbus_stubgen::generate(Path::new("dbus-stubgen.toml")).unwrap();
//! println!("{}", files.header);
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::info;

pub mod argument;
pub mod config;
pub mod ctype;
pub mod demarshal;
pub mod error;
pub mod extract;
pub mod interface;
pub mod marshal;
pub mod member;
pub mod method;
pub mod model;
pub mod output;
pub mod property;
pub mod signal;
pub mod signature;
pub mod structs;
pub mod symbol;
pub mod wire;

/// Generated file contents, plus the errors of any declarations that were
/// dropped from them.
#[derive(Debug, Clone)]
pub struct GeneratedFiles {
    pub source: String,
    pub header: String,
    pub errors: Vec<error::Error>,
}

/// Run the full pipeline: load config, generate, and write the source and
/// header files.
///
/// `config_path` is the path to a `dbus-stubgen.toml` configuration file.
/// `output_dir` optionally overrides the directory the files are written to
/// (the config file's directory by default).
///
/// Nothing is written if any declaration failed to generate.
///
/// Returns the paths of the source and header files.
pub fn run(config_path: &Path, output_dir: Option<&Path>) -> Result<(PathBuf, PathBuf)> {
    run_with_mode(config_path, output_dir, None)
}

/// [`run`], optionally overriding the configured [`model::Mode`].
pub fn run_with_mode(
    config_path: &Path,
    output_dir: Option<&Path>,
    mode: Option<model::Mode>,
) -> Result<(PathBuf, PathBuf)> {
    let mut cfg = config::load_config(config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;
    if let Some(mode) = mode {
        cfg.output.mode = mode;
    }

    let files = generate_from_config(&cfg)?;
    if !files.errors.is_empty() {
        let list: Vec<String> = files.errors.iter().map(|e| format!("  {e}")).collect();
        bail!(
            "{} declaration(s) in {} failed to generate:\n{}",
            files.errors.len(),
            config_path.display(),
            list.join("\n")
        );
    }

    let dir = match output_dir {
        Some(d) => d.to_path_buf(),
        None => config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf(),
    };
    let source_path = dir.join(&cfg.output.source);
    let header_path = dir.join(cfg.output.header_file());

    for (path, text) in [(&source_path, &files.source), (&header_path, &files.header)] {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        std::fs::write(path, text)
            .with_context(|| format!("writing output to {}", path.display()))?;
        info!(path = %path.display(), size = text.len(), "wrote file");
    }

    Ok((source_path, header_path))
}

/// Parse a `dbus-stubgen.toml` config file and return the generated text
/// without writing to disk.
pub fn generate(config_path: &Path) -> Result<GeneratedFiles> {
    let cfg = config::load_config(config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;
    generate_from_config(&cfg)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Generate file contents from an already-loaded [`config::Config`].
///
/// Declarations that fail validation are left out of the output and
/// reported in [`GeneratedFiles::errors`]; only a malformed output section
/// fails the whole call.
pub fn generate_from_config(cfg: &config::Config) -> Result<GeneratedFiles> {
    let prefix = &cfg.output.prefix;
    if !symbol::valid(prefix) {
        bail!("output prefix `{prefix}` is not a valid C identifier");
    }

    info!(
        prefix = %prefix,
        mode = ?cfg.output.mode,
        interfaces = cfg.interface.len(),
        "loaded configuration"
    );

    let mut extraction = extract::extract_node(&cfg.interface);
    structs::claim_names(prefix, &mut extraction.node, &mut extraction.errors);

    let interfaces: Vec<interface::InterfaceOutput> = extraction
        .node
        .interfaces
        .iter()
        .map(|iface| interface::generate(prefix, iface, cfg.output.mode))
        .collect();

    let source_name = file_name(&cfg.output.source);
    let header_name = file_name(&cfg.output.header_file());
    let source = output::render_source(prefix, &source_name, &header_name, &interfaces);
    let header = output::render_header(prefix, &header_name, &interfaces);

    info!(
        source = source.len(),
        header = header.len(),
        errors = extraction.errors.len(),
        "generated stubs"
    );

    Ok(GeneratedFiles {
        source,
        header,
        errors: extraction.errors,
    })
}
