//! RuStore Publisher CLI
//!
//! Uploads an Android build to RuStore and drives it through review

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rustore_publisher::api::{DEFAULT_BASE_URL, RustoreApiClient};
use rustore_publisher::core::{
    BuildFormat, ConfigLoadOptions, ConfigLoader, PublishConfig, PublishError, PublishType,
    RawPublishConfig, ServicesType,
};
use rustore_publisher::orchestration::{DraftBuilder, PublishEvent, PublishOrchestrator};
use rustore_publisher::security::{CredentialStore, Credentials};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit code for configuration and credentials errors
const EXIT_CONFIG_ERROR: i32 = 4;

/// Publish Android builds to RuStore
#[derive(Parser)]
#[command(name = "rustore-publisher")]
#[command(version)]
#[command(about = "Publish Android builds to RuStore", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload the build and submit it for review
    Publish {
        #[command(flatten)]
        config: ConfigArgs,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// API endpoint
        #[arg(long, env = "RUSTORE_API_URL", default_value = DEFAULT_BASE_URL, hide = true)]
        base_url: String,
    },

    /// Validate configuration, credentials and input files without publishing
    Check {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Args)]
struct ConfigArgs {
    /// Project directory (defaults to current directory)
    #[arg(value_name = "PROJECT_PATH")]
    project_path: Option<PathBuf>,

    /// Config file (defaults to rustore-publish.yaml in the project directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Named instance of the config file
    #[arg(short, long)]
    instance: Option<String>,

    /// Android package name of the application
    #[arg(long)]
    application_id: Option<String>,

    /// Credentials JSON file with key_id and client_secret
    #[arg(long)]
    credentials_path: Option<PathBuf>,

    /// API key id
    #[arg(long, requires = "client_secret")]
    key_id: Option<String>,

    /// API client secret
    #[arg(long, requires = "key_id")]
    client_secret: Option<String>,

    /// instantly or manual
    #[arg(long)]
    publish_type: Option<PublishType>,

    /// Timeout in seconds for each request and for status polling
    #[arg(long)]
    request_timeout: Option<u64>,

    /// unknown or hms
    #[arg(long)]
    mobile_services_type: Option<ServicesType>,

    /// apk or aab
    #[arg(long)]
    build_format: Option<BuildFormat>,

    /// Build file (defaults to the Gradle output of the variant)
    #[arg(long)]
    build_file: Option<PathBuf>,

    /// Build variant used to locate the default build file
    #[arg(long)]
    variant: Option<String>,
}

impl ConfigArgs {
    fn load_options(&self, env: HashMap<String, String>) -> ConfigLoadOptions {
        ConfigLoadOptions {
            project_path: self
                .project_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(".")),
            config_path: self.config.clone(),
            instance: self.instance.clone(),
            cli_args: Some(RawPublishConfig {
                application_id: self.application_id.clone(),
                credentials_path: self.credentials_path.clone(),
                publish_type: self.publish_type,
                request_timeout: self.request_timeout,
                mobile_services_type: self.mobile_services_type,
                build_format: self.build_format,
                build_file: self.build_file.clone(),
                variant: self.variant.clone(),
                ..Default::default()
            }),
            env,
        }
    }

    fn explicit_credentials(&self) -> Option<(String, String)> {
        self.key_id.clone().zip(self.client_secret.clone())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rustore_publisher=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run().await {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("\n❌ Error");
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Publish {
            config,
            json,
            base_url,
        } => publish_command(config, json, base_url).await,
        Commands::Check { config } => check_command(config).await,
    }
}

/// Load configuration and credentials, reporting failures on stderr
async fn prepare(args: &ConfigArgs) -> Option<(PublishConfig, Credentials)> {
    let env: HashMap<String, String> = std::env::vars().collect();

    let config = match ConfigLoader::load(args.load_options(env.clone())).await {
        Ok(config) => config,
        Err(e) => {
            print_error(&e);
            return None;
        }
    };

    let credentials =
        match CredentialStore::resolve(args.explicit_credentials(), &env, config.credentials_path())
            .await
        {
            Ok(credentials) => credentials,
            Err(e) => {
                print_error(&e);
                return None;
            }
        };

    Some((config, credentials))
}

async fn publish_command(args: ConfigArgs, json: bool, base_url: String) -> Result<i32> {
    let Some((config, credentials)) = prepare(&args).await else {
        return Ok(EXIT_CONFIG_ERROR);
    };

    if !json {
        println!("\n📦 rustore-publisher\n");
        println!("  Application: {}", config.application_id());
        println!("  Build:       {}", config.build_file().display());
        println!("  Publish:     {}\n", config.publish_type().as_wire());
    }

    let client = RustoreApiClient::new(base_url, config.request_timeout())
        .context("failed to create API client")?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            interrupt.cancel();
        }
    });

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let progress = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if !json {
                print_event(&event);
            }
        }
    });

    let report = PublishOrchestrator::new(Arc::new(client), config, credentials)
        .with_cancellation(cancel)
        .with_events(events_tx)
        .run()
        .await;
    // The sender is dropped with the orchestrator, so this ends
    let _ = progress.await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report.to_json())?);
    } else if report.outcome.is_success() {
        println!("\n✅ {}", report.summary());
    } else {
        println!("\n❌ {}", report.summary());
        if let rustore_publisher::PublishOutcome::Failed { error } = &report.outcome {
            print_suggestions(error);
        }
    }

    Ok(report.outcome.exit_code())
}

async fn check_command(args: ConfigArgs) -> Result<i32> {
    println!("\n🔍 RuStore Publish Check\n");

    let Some((config, credentials)) = prepare(&args).await else {
        return Ok(EXIT_CONFIG_ERROR);
    };
    println!("  ✅ Configuration valid ({})", config.application_id());
    println!("  ✅ Credentials loaded (key {})", credentials.key_id());

    let mut ok = true;

    if tokio::fs::try_exists(config.build_file()).await.unwrap_or(false) {
        println!("  ✅ Build file {}", config.build_file().display());
    } else {
        println!("  ❌ Build file {} not found", config.build_file().display());
        ok = false;
    }

    match DraftBuilder::new(&config).build().await {
        Ok(draft) if draft.whats_new.is_empty() => println!("  ⚠️  No release notes"),
        Ok(draft) => println!(
            "  ✅ Release notes ({} characters)",
            draft.whats_new.chars().count()
        ),
        Err(e) => {
            println!("  ❌ {}", e);
            ok = false;
        }
    }

    if let Some(phase) = config.release_phase() {
        println!("  ℹ️  Staged rollout to {}% of users", phase.percent);
    }
    if !config.seo_tags().is_empty() {
        println!("  ℹ️  {} SEO tag(s)", config.seo_tags().len());
    }

    if ok {
        println!("\n✅ Ready to publish");
        Ok(0)
    } else {
        println!("\n❌ Not ready to publish");
        Ok(EXIT_CONFIG_ERROR)
    }
}

fn print_event(event: &PublishEvent) {
    match event {
        PublishEvent::StateChanged { to, .. } => println!("  → {}", to),
        PublishEvent::Retrying { step, attempt } => {
            println!("  ↻ {}: attempt {}", step, attempt)
        }
        PublishEvent::StatusPolled { state } => println!("    status: {}", state),
    }
}

fn print_error(error: &PublishError) {
    eprintln!("\n❌ {}", error);
    print_suggestions(error);
}

fn print_suggestions(error: &PublishError) {
    let actions = error.suggested_actions();
    if !actions.is_empty() {
        eprintln!("\n💡 Suggestions:");
        for action in actions {
            eprintln!("  - {}", action);
        }
    }
}
