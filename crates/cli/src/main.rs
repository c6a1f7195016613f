use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use libris_kernel::settings::Settings;

/// Libris - library catalogue and lending service
#[derive(Parser, Debug)]
#[command(name = "libris")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding base.toml and the per-environment overlays
    #[arg(long, global = true, env = "LIBRIS_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Environment overlay to load (local, staging, production)
    #[arg(long = "env", global = true, env = "LIBRIS_ENV")]
    environment: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server until Ctrl-C or SIGTERM
    Serve,
    /// Print the merged OpenAPI document
    Openapi {
        /// Indent the output
        #[arg(long)]
        pretty: bool,
    },
    /// Print the resolved configuration
    Config,
}

impl Cli {
    fn settings(&self) -> anyhow::Result<Settings> {
        if self.config_dir.is_none() && self.environment.is_none() {
            return Settings::load().with_context(|| "failed to load libris settings");
        }

        let dir = match &self.config_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()
                .with_context(|| "unable to resolve current directory")?
                .join("config"),
        };
        let environment = self.environment.as_deref().unwrap_or("local");
        Settings::load_from(&dir, environment)
            .with_context(|| format!("failed to load settings from {}", dir.display()))
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings()?;

    match cli.command {
        Command::Serve => {
            libris_telemetry::init(&settings.telemetry)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to build tokio runtime")?;
            runtime.block_on(libris_app::run(settings))
        }
        Command::Openapi { pretty } => {
            let registry = libris_app::build_registry();
            let document = libris_http::router::openapi_document(&registry);
            let rendered = if pretty {
                serde_json::to_string_pretty(&document)?
            } else {
                serde_json::to_string(&document)?
            };
            println!("{rendered}");
            Ok(())
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
    }
}
