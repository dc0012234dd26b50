//! Binary entry point: configuration, collaborator wiring, HTTP server.

use anyhow::Context;
use clap::Parser;
use odata_bridge::agent::QueryOrchestrator;
use odata_bridge::api::{ApiState, start_http_server};
use odata_bridge::config::BridgeConfig;
use odata_bridge::odata::ODataClient;
use odata_bridge::tools::OdataQueryTool;
use odata_bridge::vector::{
    EmbeddingModel, LanceStore, MetadataIndexer, MetadataSearch, MetadataTable,
};
use rig::client::CompletionClient;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "odata-bridge", about = "OData to LLM bridge", version)]
struct Cli {
    /// Path to the configuration file (default: bridge.toml if present).
    #[arg(long)]
    config: Option<String>,
    /// Rebuild the metadata index on startup.
    #[arg(long)]
    reindex: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = BridgeConfig::load(cli.config.as_deref()).context("loading configuration")?;

    std::fs::create_dir_all(&config.storage.data_dir).context("creating data directory")?;

    let client = Arc::new(ODataClient::new(&config.odata, &config.indexing)?);

    let embedder = Arc::new(EmbeddingModel::new(&config.storage.data_dir.join("models"))?);
    let db_path = config.storage.data_dir.join("lancedb");
    let connection = lancedb::connect(db_path.to_str().context("data dir is not valid UTF-8")?)
        .execute()
        .await
        .context("connecting to lancedb")?;
    let table = MetadataTable::open_or_create(&connection).await?;
    let store = Arc::new(LanceStore::new(table, embedder));

    let indexer = Arc::new(MetadataIndexer::new(
        store.clone(),
        client.clone(),
        config.indexing.clone(),
    ));
    let search = Arc::new(MetadataSearch::new(store, config.indexing.clone()));

    if cli.reindex {
        indexer.rebuild_index().await?;
    }

    let llm = rig::providers::ollama::Client::from_url(&config.ai.base_url);
    let model = llm.completion_model(&config.ai.model);

    let orchestrator = Arc::new(QueryOrchestrator::new(
        model,
        search.clone(),
        OdataQueryTool::new(client),
        config.ai.clone(),
        config.indexing.narrow_entity_fields,
    ));

    let state = Arc::new(ApiState {
        orchestrator,
        indexer,
        search,
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let server = start_http_server(config.server.bind, state, shutdown_rx).await?;

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutting down");
    let _ = shutdown_tx.send(true);
    server.await?;

    Ok(())
}
