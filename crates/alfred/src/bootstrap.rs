//! Builds a ready-to-run agent from settings.
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Client;

use crate::agent::Agent;
use crate::config::{EmbedderKind, Settings};
use crate::guests::GuestStore;
use crate::prompt_template::render_system_prompt;
use crate::providers::base::Provider;
use crate::providers::openai::OpenAiProvider;
use crate::retriever::embedding::{Embedder, HashingEmbedder, OpenAiEmbedder};
use crate::retriever::HybridRetriever;
use crate::telemetry::{LangfuseSink, LogSink, Telemetry};
use crate::tools::{BuiltinTool, GuestInfoTool, HubStatsTool, ToolRegistry, WebSearchTool};

pub fn load_guests(settings: &Settings) -> Result<GuestStore> {
    match &settings.guests.path {
        Some(path) => GuestStore::load(path),
        None => GuestStore::bundled(),
    }
}

pub fn build_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    Ok(match settings.retriever.embedder {
        EmbedderKind::Hashing => Arc::new(HashingEmbedder::default()),
        EmbedderKind::OpenAi => Arc::new(OpenAiEmbedder::new(
            &settings.openai_config()?,
            settings.retriever.embedding_model.clone(),
        )?),
    })
}

pub async fn build_retriever(settings: &Settings) -> Result<HybridRetriever> {
    let store = load_guests(settings)?;
    let embedder = build_embedder(settings)?;
    HybridRetriever::build(store, embedder, settings.retriever_config())
        .await
        .context("failed to index the guest list")
}

pub async fn build_registry(settings: &Settings, client: &Client) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for tool in &settings.tools.enabled {
        match tool {
            BuiltinTool::GuestInfoRetriever => {
                let retriever = Arc::new(build_retriever(settings).await?);
                registry.register(Arc::new(GuestInfoTool::new(retriever)))?;
            }
            BuiltinTool::WebSearch => {
                registry.register(Arc::new(WebSearchTool::new(client.clone())))?;
            }
            BuiltinTool::GetHubStats => {
                registry.register(Arc::new(HubStatsTool::new(client.clone())))?;
            }
        }
    }
    Ok(registry)
}

pub fn build_telemetry(settings: &Settings) -> Result<Telemetry> {
    let mut telemetry = Telemetry::default();
    if settings.telemetry.log_events {
        telemetry = telemetry.with_sink(Arc::new(LogSink));
    }
    if let Some(config) = settings.langfuse_config() {
        tracing::info!(host = %config.host, "sending traces to Langfuse");
        telemetry = telemetry.with_sink(Arc::new(LangfuseSink::new(config)?));
    }
    Ok(telemetry)
}

/// Everything a turn needs: provider, tools, prompt and telemetry
pub async fn build_agent(settings: &Settings) -> Result<Agent> {
    settings.validate()?;
    let provider = OpenAiProvider::new(settings.openai_config()?)?;
    if settings.provider.verify_on_start {
        provider
            .check()
            .await
            .with_context(|| format!("language model endpoint {} is not usable", settings.provider.host))?;
    }
    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;
    let registry = build_registry(settings, &client).await?;

    let mut agent = Agent::new(Box::new(provider), registry, settings.agent_config()?)?;
    if let Some(template) = &settings.agent.system_prompt {
        let prompt = render_system_prompt(&agent.tools().descriptors(), Some(template.as_path()))
            .with_context(|| format!("failed to render {}", template.display()))?;
        agent = agent.with_system_prompt(prompt);
    }

    tracing::info!(
        model = %settings.provider.model,
        tools = ?agent.tools().names(),
        max_steps = settings.agent.max_steps,
        memory_window = settings.agent.memory_window,
        "agent ready"
    );
    Ok(agent.with_telemetry(build_telemetry(settings)?))
}
