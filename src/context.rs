use std::sync::Arc;

use crate::config::Config;
use crate::engine::TransportEngine;
use crate::listener::CompletionRegistry;
use crate::request::UrlRequestBuilder;

/// Everything requests share: the transport engine, configuration, and the
/// completion listeners.
#[derive(Clone)]
pub struct RequestContext {
    engine: Arc<dyn TransportEngine>,
    config: Config,
    listeners: CompletionRegistry,
}

impl RequestContext {
    pub fn new(engine: Arc<dyn TransportEngine>, config: Config) -> Self {
        Self {
            engine,
            config,
            listeners: CompletionRegistry::new(),
        }
    }

    /// Uses `listeners` instead of a fresh, empty registry.
    pub fn with_listeners(mut self, listeners: CompletionRegistry) -> Self {
        self.listeners = listeners;
        self
    }

    pub fn engine(&self) -> &Arc<dyn TransportEngine> {
        &self.engine
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn listeners(&self) -> &CompletionRegistry {
        &self.listeners
    }

    /// Starts building a request for `url` bound to this context.
    pub fn request(&self, url: impl Into<String>) -> UrlRequestBuilder {
        UrlRequestBuilder::new().context(self.clone()).url(url)
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
