//! berth CLI
//!
//! Thin wrapper over the reconciliation engine: each subcommand reads a
//! YAML document, acts on it and writes the updated state back, which is
//! the caller's recovery protocol after partial failures.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use serde::{Deserialize, Serialize};

use berth_controlplane::Controlplane;
use berth_core::{Containers, DefaultSessionFactory};
use berth_pki::{Certificate, Kubernetes};

#[derive(Parser)]
#[command(name = "berth")]
#[command(about = "Declarative containers on remote hosts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh and print the state of deployed containers
    Check {
        /// Containers state document
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Reconcile containers with the desired state
    Deploy {
        /// Containers state document
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Deploy a static Kubernetes control plane
    Controlplane {
        /// Control plane configuration document
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Generate a Kubernetes control plane PKI
    Pki {
        /// PKI document
        #[arg(short, long)]
        file: PathBuf,
    },
}

/// PKI document: an optional root CA plus the Kubernetes PKI settings
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PkiDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    root_ca: Option<Certificate>,
    kubernetes: Kubernetes,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { file } => check(&file).await,
        Commands::Deploy { file } => deploy(&file).await,
        Commands::Controlplane { file } => controlplane(&file).await,
        Commands::Pki { file } => pki(&file),
    }
}

async fn check(file: &PathBuf) -> Result<()> {
    let containers = Containers::from_yaml(&std::fs::read_to_string(file)?)?;

    let mut engine = containers.build(Arc::new(DefaultSessionFactory::new()))?;
    engine.check_current_state().await?;

    print!("{}", engine.current_state_to_yaml()?);
    Ok(())
}

async fn deploy(file: &PathBuf) -> Result<()> {
    let containers = Containers::from_yaml(&std::fs::read_to_string(file)?)?;

    let mut engine = containers.build(Arc::new(DefaultSessionFactory::new()))?;
    let result = engine.deploy().await;

    // Persist whatever happened, so the next run resumes from reality.
    std::fs::write(file, engine.to_exported().to_yaml()?)?;

    result?;
    Ok(())
}

async fn controlplane(file: &PathBuf) -> Result<()> {
    let mut document: Controlplane = serde_yaml::from_str(&std::fs::read_to_string(file)?)?;

    let containers = document.to_containers()?;
    let mut engine = containers.build(Arc::new(DefaultSessionFactory::new()))?;
    let result = engine.deploy().await;

    document.state = engine.to_exported().previous_state;
    std::fs::write(file, serde_yaml::to_string(&document)?)?;

    result?;
    Ok(())
}

fn pki(file: &PathBuf) -> Result<()> {
    let mut document: PkiDocument = serde_yaml::from_str(&std::fs::read_to_string(file)?)?;

    document
        .kubernetes
        .generate(document.root_ca.as_ref(), &Certificate::default())?;

    std::fs::write(file, serde_yaml::to_string(&document)?)?;
    Ok(())
}
