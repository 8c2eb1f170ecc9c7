use anyhow::Context;
use clap::{Parser, Subcommand};
use phishscan_engine::{CheckReport, EngineConfig, ModelId, ModelKind, PhishingEngine};
use std::{path::PathBuf, process::ExitCode};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SAFE_EXAMPLES: &[&str] = &[
    "https://www.google.com",
    "https://www.github.com",
    "https://www.wikipedia.org",
];

const SUSPICIOUS_EXAMPLES: &[&str] = &[
    "https://rtyu38.godaddysites.com/",
    "http://www.aborderlaviolence.org/gtr/irz/",
];

#[derive(Parser)]
#[command(name = "phishscan", version, about = "Check whether a web page looks like phishing")]
struct Cli {
    /// TOML configuration file (defaults to ./phishscan.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the classifier artifacts
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch a URL and classify it
    Check {
        url: String,

        /// Classifier to use, e.g. random-forest or "Decision Tree"
        #[arg(long, short)]
        model: Option<ModelId>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the available classifiers and whether their artifacts exist
    Models,
    /// Print sample URLs to try
    Examples,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "phishscan_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(dir) = cli.model_dir {
        config.model_dir = dir;
    }

    match cli.command {
        Command::Check { url, model, json } => {
            let model = model.unwrap_or(config.default_model);
            let engine = PhishingEngine::from_config(&config)
                .await
                .context("failed to initialize the engine")?;
            let report = engine.check(&url, model).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            Ok(if report.verdict.is_label() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
        Command::Models => {
            info!("Listing models in {}", config.model_dir.display());
            for model in ModelId::ALL {
                let path = config.model_dir.join(model.artifact_name());
                let present = tokio::fs::try_exists(&path).await.unwrap_or(false);
                println!(
                    "{:<24} {:<24} {:<16} {}",
                    model.slug(),
                    model.display_name(),
                    ModelKind::for_model(model),
                    if present { path.display().to_string() } else { "(missing)".to_string() }
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Examples => {
            println!("Safe examples:");
            for url in SAFE_EXAMPLES {
                println!("  {}", url);
            }
            println!("Potential phishing examples:");
            for url in SUSPICIOUS_EXAMPLES {
                println!("  {}", url);
            }
            println!("Note: phishing sites are short-lived, these may already be offline.");
            Ok(ExitCode::SUCCESS)
        }
        Command::Config => {
            print!("{}", config.to_toml().context("failed to render configuration")?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_report(report: &CheckReport) {
    println!("[{}] {}", report.model, report.message());
    if let Some(advice) = report.verdict.advice() {
        println!("{}", advice);
    }
    println!("check {} finished in {:.0}ms", report.check_id, report.elapsed_ms);
}
