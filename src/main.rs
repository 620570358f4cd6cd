#![allow(missing_docs)]

//! Mailvault CLI: classify messages, run the extraction workflow, or build
//! vault payloads from JSON message documents.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use mailvault::agent::AgentWorkflow;
use mailvault::classifier::{Domain, DomainClassifier};
use mailvault::config::{self, Config};
use mailvault::domain_parser::DomainParser;
use mailvault::email::{parse_email_str, validate_email, EmailInput};
use mailvault::embedding::OllamaEmbedder;
use mailvault::logging;
use mailvault::providers::ollama::OllamaProvider;
use mailvault::providers::parse_provider_string;
use mailvault::vault::add_email_to_vault;

#[derive(Parser, Debug)]
#[command(name = "mailvault", version, about = "Route email into personal vaults")]
struct Cli {
    #[arg(long, global = true, help = "Config file (default: ~/.mailvault/config.toml)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score messages against the domain categories.
    Classify {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Run the extraction workflow.
    Process {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long, default_value_t = false, help = "Use the blocking entry point")]
        blocking: bool,
        #[arg(long, help = "Also write JSON logs to this directory")]
        logs_dir: Option<PathBuf>,
    },
    /// Pull every record out of messages for one domain, in one session.
    Parse {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long, help = "education, medical, legal, personal or other")]
        domain: Domain,
    },
    /// Build the storable payload for an already-routed message.
    Payload {
        file: PathBuf,
        #[arg(long)]
        vault_type: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard = match &cli.command {
        Commands::Process {
            logs_dir: Some(dir),
            ..
        } => Some(logging::init_production(dir)?),
        _ => {
            logging::init_cli();
            None
        }
    };

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Classify { files } => classify(&config, &files).await,
        Commands::Process {
            files, blocking, ..
        } => process(&config, &files, blocking).await,
        Commands::Parse { files, domain } => parse(&config, &files, domain).await,
        Commands::Payload { file, vault_type } => {
            let email = read_email(&file)?;
            print_json(&add_email_to_vault(&email, &vault_type))
        }
    }
}

fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => config::config_path()?,
    };
    config::load_or_default(&path)
}

fn read_email(path: &Path) -> Result<EmailInput> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let email =
        parse_email_str(&text).with_context(|| format!("invalid message in {}", path.display()))?;
    if !validate_email(&email) {
        anyhow::bail!("message in {} is incomplete", path.display());
    }
    Ok(email)
}

fn read_emails(paths: &[PathBuf]) -> Result<Vec<EmailInput>> {
    paths.iter().map(|p| read_email(p)).collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render result")?;
    println!("{rendered}");
    Ok(())
}

async fn classify(config: &Config, files: &[PathBuf]) -> Result<()> {
    let emails = read_emails(files)?;
    let embedder = OllamaEmbedder::with_base_url(
        &config.models.embedding,
        &config.models.ollama_url,
        config.models.embedding_dimensions,
    );
    let classifier = DomainClassifier::new(Arc::new(embedder))
        .await
        .context("failed to build classifier")?;

    let results = classifier
        .classify(&emails)
        .await
        .context("classification failed")?;
    print_json(&results)
}

async fn reasoning_provider(config: &Config) -> Result<OllamaProvider> {
    let (provider_name, model) = parse_provider_string(&config.models.reasoning)?;
    if provider_name != "ollama" {
        anyhow::bail!("unsupported reasoning provider {provider_name:?}, only ollama is available");
    }
    let provider = OllamaProvider::new(config.models.reasoning.clone(), model.to_owned())
        .with_base_url(&config.models.ollama_url)
        .with_temperature(config.models.temperature);
    provider
        .check_model()
        .await
        .with_context(|| format!("reasoning model {model} is not usable"))?;
    Ok(provider)
}

async fn process(config: &Config, files: &[PathBuf], blocking: bool) -> Result<()> {
    let emails = read_emails(files)?;
    let provider = reasoning_provider(config).await?;

    let workflow = AgentWorkflow::with_config(Arc::new(provider), config.workflow.clone());
    info!(count = emails.len(), blocking, "processing messages");

    let responses: Vec<_> = if blocking {
        emails.iter().map(|e| workflow.process_email(e)).collect()
    } else {
        workflow.process_many(emails).await
    };
    print_json(&responses)
}

#[derive(Serialize)]
struct ParsedMessage {
    file: PathBuf,
    records: Vec<mailvault::domain_parser::DomainRecord>,
}

async fn parse(config: &Config, files: &[PathBuf], domain: Domain) -> Result<()> {
    let emails = read_emails(files)?;
    let provider = reasoning_provider(config).await?;
    let parser = DomainParser::with_config(Arc::new(provider), &config.workflow);
    let mut conversation = DomainParser::conversation();

    let mut parsed = Vec::with_capacity(emails.len());
    for (file, email) in files.iter().zip(&emails) {
        let records = parser
            .parse_email(&mut conversation, email, domain)
            .await
            .with_context(|| format!("failed to parse {}", file.display()))?;
        parsed.push(ParsedMessage {
            file: file.clone(),
            records,
        });
    }
    print_json(&parsed)
}
