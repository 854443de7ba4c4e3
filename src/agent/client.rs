//! Model client: one provider adapter paired with its transports.

use std::sync::Arc;

use crate::error::{Result, TesseraError};
use crate::provider::{AsyncTransport, ProviderAdapter, Transport};

/// A provider adapter plus the transports that carry its requests.
///
/// Either transport may be absent; running in a mode whose transport is
/// missing fails with a configuration error.
#[derive(Clone)]
pub struct ModelClient {
    adapter: Arc<dyn ProviderAdapter>,
    transport: Option<Arc<dyn Transport>>,
    async_transport: Option<Arc<dyn AsyncTransport>>,
    model: String,
}

impl ModelClient {
    pub fn new(adapter: impl ProviderAdapter + 'static, model: impl Into<String>) -> Self {
        Self {
            adapter: Arc::new(adapter),
            transport: None,
            async_transport: None,
            model: model.into(),
        }
    }

    /// Set the transport used by blocking runs.
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Set the transport used by async runs.
    pub fn with_async_transport(mut self, transport: impl AsyncTransport + 'static) -> Self {
        self.async_transport = Some(Arc::new(transport));
        self
    }

    /// Use one value for both execution modes.
    pub fn with_shared_transport<T>(mut self, transport: T) -> Self
    where
        T: Transport + AsyncTransport + 'static,
    {
        let shared = Arc::new(transport);
        self.transport = Some(shared.clone());
        self.async_transport = Some(shared);
        self
    }

    /// OpenAI Responses client over HTTP, configured from `config`.
    #[cfg(all(feature = "openai", feature = "http"))]
    pub fn openai(config: &crate::config::TesseraConfig) -> Result<Self> {
        let transport = crate::provider::http::HttpTransport::from_config(config)?;
        Ok(Self::new(
            crate::provider::openai::OpenAiResponsesAdapter::new(),
            config.default_model.clone(),
        )
        .with_shared_transport(transport))
    }

    /// OpenAI Responses client configured from the environment.
    #[cfg(all(feature = "openai", feature = "http"))]
    pub fn openai_from_env() -> Result<Self> {
        Self::openai(crate::config::TesseraConfig::global())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn adapter(&self) -> &Arc<dyn ProviderAdapter> {
        &self.adapter
    }

    pub fn transport(&self) -> Result<Arc<dyn Transport>> {
        self.transport.clone().ok_or_else(|| {
            TesseraError::Configuration(format!(
                "no blocking transport configured for provider '{}'",
                self.adapter.provider_name()
            ))
        })
    }

    pub fn async_transport(&self) -> Result<Arc<dyn AsyncTransport>> {
        self.async_transport.clone().ok_or_else(|| {
            TesseraError::Configuration(format!(
                "no async transport configured for provider '{}'",
                self.adapter.provider_name()
            ))
        })
    }
}

impl std::fmt::Debug for ModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelClient")
            .field("provider", &self.adapter.provider_name())
            .field("model", &self.model)
            .field("blocking", &self.transport.is_some())
            .field("async", &self.async_transport.is_some())
            .finish()
    }
}
