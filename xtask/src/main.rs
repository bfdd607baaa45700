// Desktop/tooling crate — unwrap/expect/panic acceptable in non-embedded code.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod flash_map;
mod package;
mod version;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use firmware_release::{BuildEnv, DEFAULT_CONFIG_FILE};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Firmware release tasks", long_about = None)]
#[command(version)]
struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the version tag used as the program name for this build
    Version {
        #[command(flatten)]
        env: EnvArgs,
    },
    /// Print the flash map JSON without copying anything
    FlashMap {
        #[command(flatten)]
        env: EnvArgs,
    },
    /// Post-build step: copy artifacts into build_outputs/ and write the flash map
    Package {
        #[command(flatten)]
        env: EnvArgs,
        /// Remove files left by an earlier run of the same version
        #[arg(long)]
        clean: bool,
    },
}

/// Where the build environment comes from, plus command-line overrides.
#[derive(Args)]
struct EnvArgs {
    /// Build environment file written by the firmware build
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Override PROJECT_DIR
    #[arg(long)]
    project_dir: Option<PathBuf>,
    /// Override BUILD_DIR
    #[arg(long)]
    build_dir: Option<PathBuf>,
    /// Extra build definition, NAME=VALUE (repeatable; wins over BUILD_FLAGS)
    #[arg(short = 'D', long = "define", value_name = "NAME=VALUE")]
    defines: Vec<String>,
}

impl EnvArgs {
    fn load(self) -> Result<BuildEnv> {
        let mut env = BuildEnv::load(&self.config)
            .with_context(|| format!("Failed to load {}", self.config.display()))?;
        if let Some(dir) = self.project_dir {
            env.project_dir = dir;
        }
        if let Some(dir) = self.build_dir {
            env.build_dir = dir;
        }
        env.overrides.extend(self.defines);
        Ok(env)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Version { env } => env.load().and_then(|env| version::run(&env)),
        Commands::FlashMap { env } => env.load().and_then(|env| flash_map::run(&env)),
        Commands::Package { env, clean } => env.load().and_then(|env| package::run(&env, clean)),
    };

    if let Err(err) = result {
        eprintln!("{} {:#}", "✗".red().bold(), err);
        std::process::exit(1);
    }
}
