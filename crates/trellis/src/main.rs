//! Trellis CLI - Template view engine.
//!
//! Provides commands for:
//! - `render`: Render a view through its layout
//! - `partials`: List discovered partial names
//! - `precompile`: Export precompiled templates as JSON

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{PartialsArgs, PrecompileArgs, RenderArgs};
use output::Output;

/// Trellis - Template view engine.
#[derive(Parser)]
#[command(name = "trellis", version, about)]
struct Cli {
    /// Enable verbose output (info-level logs on stderr).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a view and print the HTML.
    Render(RenderArgs),
    /// List partial names.
    Partials(PartialsArgs),
    /// Print precompiled templates of a directory as JSON.
    Precompile(PrecompileArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Render(args) => args.execute(&output),
        Commands::Partials(args) => args.execute(&output),
        Commands::Precompile(args) => args.execute(&output),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
