use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use crate::config::AppConfig;
use crate::handlers::{crm::fetch_branches, sync::sync_once};
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "lineaschool-api")]
#[command(about = "LineaSchool backend - HTTP endpoints and AlfaCRM sync")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Print command results as JSON")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server (default)")]
    Serve {
        #[arg(long, help = "Port to bind, overrides LINEASCHOOL_API_PORT / PORT")]
        port: Option<u16>,
    },

    #[command(about = "Run one AlfaCRM → database sync and print the stats")]
    Sync,

    #[command(about = "List AlfaCRM branches for the configured account")]
    Branches,
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::from_env();
    info!("Starting LineaSchool API in {:?} mode", config.environment);

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => serve(config, port).await,
        Commands::Sync => {
            let state = AppState::new(config);
            let report = sync_once(&state).await?;
            if cli.json {
                println!("{}", json!({"stats": report.stats(), "errors": report.errors}));
            } else {
                println!("students: {:?}", report.students);
                println!("teachers: {:?}", report.teachers);
                println!("lessons:  {:?}", report.lessons);
                for error in &report.errors {
                    println!("  {}", error);
                }
            }
            Ok(())
        }
        Commands::Branches => {
            let state = AppState::new(config);
            let page = fetch_branches(&state).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&page)?);
            } else {
                for branch in &page.items {
                    println!("{}\t{}", branch["id"], branch["name"].as_str().unwrap_or_default());
                }
                println!("{} branch(es)", page.items.len());
            }
            Ok(())
        }
    }
}

async fn serve(mut config: AppConfig, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    if config.database.url.is_none() {
        tracing::warn!("DATABASE_URL is not set; database endpoints will answer 500");
    }

    let app = crate::app(AppState::new(config));
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    info!("LineaSchool API listening on http://{}", bind_addr);
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
