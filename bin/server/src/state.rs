//! Shared application state and its construction from configuration.

use crate::config::ServerConfig;
use crate::error::ServerError;
use std::sync::Arc;
use switchboard_ai::{LlmBackendConfig, OpenAiCompatibleBackend};
use switchboard_conversation::{InMemoryAuditLog, Orchestrator, ToolCatalog};
use switchboard_integration::{ActionPlatformConfig, HttpActionConnector};
use tracing::info;

/// State handed to every request handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Creates state around an existing orchestrator.
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Wires the orchestrator and its HTTP collaborators from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be loaded or a client cannot be
    /// constructed.
    pub fn from_config(config: &ServerConfig) -> switchboard_core::Result<Self, ServerError> {
        let catalog = ToolCatalog::load(&config.tool_config_path).map_err(|e| {
            ServerError::Catalog {
                details: e.to_string(),
            }
        })?;
        info!(
            path = %config.tool_config_path.display(),
            tools = catalog.len(),
            "loaded tool catalog"
        );

        let backend = OpenAiCompatibleBackend::new(
            LlmBackendConfig::openai_compatible(&config.llm.base_url, &config.llm.model)
                .with_api_key(&config.llm.api_key),
        )
        .map_err(|e| ServerError::Backend {
            details: e.to_string(),
        })?;

        let connector = HttpActionConnector::new(
            ActionPlatformConfig::new(&config.connector.secret_key)
                .with_base_url(&config.connector.base_url),
        )
        .map_err(|e| ServerError::Connector {
            details: e.to_string(),
        })?;

        let orchestrator = Orchestrator::new(
            Arc::new(backend),
            Arc::new(connector),
            Arc::new(catalog),
            Arc::new(InMemoryAuditLog::new()),
            config.orchestrator_config(),
        );

        Ok(Self::new(Arc::new(orchestrator)))
    }
}
