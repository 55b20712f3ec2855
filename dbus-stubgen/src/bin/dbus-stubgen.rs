//! CLI entry point for dbus-stubgen.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use dbus_stubgen::model::Mode;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    /// Exported object dispatch and signal emitters.
    Object,
    /// Proxy calls and signal filters.
    Proxy,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Object => Mode::Object,
            ModeArg::Proxy => Mode::Proxy,
        }
    }
}

/// dbus-stubgen: generate C marshalling stubs for D-Bus interfaces.
#[derive(Parser, Debug)]
#[command(name = "dbus-stubgen", version, about)]
struct Cli {
    /// Path to the dbus-stubgen.toml configuration file.
    #[arg(default_value = "dbus-stubgen.toml")]
    config: PathBuf,

    /// Directory to write the generated files to (overrides the config's directory).
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Generate object or proxy code (overrides config).
    #[arg(short, long, value_enum)]
    mode: Option<ModeArg>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dbus_stubgen=info")),
        )
        .init();

    let cli = Cli::parse();
    dbus_stubgen::run_with_mode(
        &cli.config,
        cli.output_dir.as_deref(),
        cli.mode.map(Mode::from),
    )?;
    Ok(())
}
