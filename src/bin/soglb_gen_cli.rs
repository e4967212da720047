//! soglb-gen CLI
//!
//! Commands: generate, levels, extensions
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 when validation blocks generation

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;

use soglb_gen::{guard::level_guards, GeneratorConfig, GenerationPipeline, PipelineError};

#[derive(Parser)]
#[command(name = "soglb-gen-cli")]
#[command(about = "soglb-gen CLI - OpenGL binding generator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate bindings for every enabled API
    Generate,

    /// List the feature-level guards of an API
    Levels {
        /// API name
        #[arg(short, long, default_value = "gl")]
        api: String,
    },

    /// List extensions with their enabled flag and target APIs
    Extensions,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => match GeneratorConfig::load_from_file(path) {
            Ok(c) => c,
            Err(e) => return failure(&e.to_string()),
        },
        None => GeneratorConfig::default(),
    };
    let pipeline = GenerationPipeline::new(config);

    match cli.command {
        Commands::Generate => match pipeline.run() {
            Ok(manifest) => print_json(&serde_json::json!({ "success": true, "manifest": manifest })),
            Err(e @ PipelineError::ValidationBlocked { .. }) => {
                print_json(&serde_json::json!({ "success": false, "error": e.to_string() }));
                ExitCode::from(2)
            }
            Err(e) => failure(&e.to_string()),
        },

        Commands::Levels { api } => {
            let availability = match pipeline
                .load_registry()
                .and_then(|loaded| pipeline.resolve(&loaded.registry))
            {
                Ok(a) => a,
                Err(e) => return failure(&e.to_string()),
            };
            match availability.api(&api) {
                Some(resolved) => print_json(&level_guards(resolved, &pipeline.config().guard_prefix)),
                None => failure(&format!("API not found: {}", api)),
            }
        }

        Commands::Extensions => {
            let availability = match pipeline
                .load_registry()
                .and_then(|loaded| pipeline.resolve(&loaded.registry))
            {
                Ok(a) => a,
                Err(e) => return failure(&e.to_string()),
            };
            let extensions: Vec<_> = availability
                .extensions
                .iter()
                .map(|ext| {
                    serde_json::json!({
                        "name": ext.name,
                        "enabled": ext.enabled,
                        "apis": ext.apis.keys().collect::<Vec<_>>(),
                    })
                })
                .collect();
            print_json(&extensions)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => failure(&e.to_string()),
    }
}

fn failure(message: &str) -> ExitCode {
    println!("{}", serde_json::json!({ "success": false, "error": message }));
    ExitCode::FAILURE
}
