//! Subcommand handlers.

use crate::{Commands, ConfigAction};
use profscope_core::config::write_default_config;
use profscope_core::{
    AppConfig, AppState, ChatPipeline, JsonFileCorpus, ReviewCorpus, ServiceClients, ServiceKeys,
    gateway, load_config,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    if let Commands::Config {
        action: ConfigAction::Init,
    } = command
    {
        let path = write_default_config(workspace)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let config = load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    config.validate()?;

    match command {
        Commands::Config { .. } => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Serve { host, port } => {
            let (corpus, clients) = bootstrap(&config, workspace).await?;
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let state = Arc::new(AppState::new(&config, corpus, &clients));
            info!(host = %host, port, "Starting gateway");
            gateway::run(state, &host, port).await?;
            Ok(())
        }
        Commands::Ask { query } => {
            let (corpus, clients) = bootstrap(&config, workspace).await?;
            let pipeline = ChatPipeline::from_clients(&config, corpus, &clients);
            let outcome = pipeline.answer(&query).await;
            println!("{}", outcome.content);
            Ok(())
        }
        Commands::Reindex => {
            let (corpus, clients) = bootstrap(&config, workspace).await?;
            let Some(indexer) = clients.indexer() else {
                anyhow::bail!(
                    "{} and {} required",
                    config.vector_index.api_key_env,
                    config.embedding.api_key_env
                );
            };
            let upserted = indexer.reindex(&corpus.snapshot()).await?;
            println!("Reindex complete: {upserted} vectors upserted");
            Ok(())
        }
    }
}

/// Open the corpus and build the service clients from the environment.
async fn bootstrap(
    config: &AppConfig,
    workspace: &Path,
) -> anyhow::Result<(Arc<dyn ReviewCorpus>, ServiceClients)> {
    let corpus_path = AppConfig::resolve_path(workspace, &config.corpus.path);
    let corpus: Arc<dyn ReviewCorpus> = Arc::new(JsonFileCorpus::open(&corpus_path).await?);
    let keys = ServiceKeys::from_env(config);
    let features = keys.features();
    info!(
        ?keys,
        vector_search = features.vector_search,
        generation = features.generation,
        "Service credentials resolved"
    );
    let clients = ServiceClients::from_config(config, &keys, workspace)?;
    Ok((corpus, clients))
}
