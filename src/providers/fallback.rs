use crate::config::LlmConfig;
use crate::providers::{LlmProvider, ProviderError, ProviderFactory};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Tries providers in configured order, retrying each before moving on
pub struct FallbackProvider {
    providers: Vec<Arc<dyn LlmProvider>>,
    policy: RetryPolicy,
}

impl FallbackProvider {
    /// Create a new fallback provider from configuration
    pub fn new(config: &LlmConfig) -> Result<Self, ProviderError> {
        if !config.fallback.enabled {
            // If fallback is disabled, just use the default provider
            let default_provider = ProviderFactory::get_default_provider(config)?;
            return Ok(Self::with_providers(vec![default_provider], RetryPolicy::once()));
        }

        let timeout = Duration::from_secs(config.timeout);
        let mut providers = Vec::new();

        // Create providers in fallback order
        for provider_name in &config.fallback.order {
            if let Some(provider_config) = config.providers.get(provider_name) {
                if provider_config.enabled {
                    match ProviderFactory::create(provider_name, provider_config, timeout) {
                        Ok(provider) => {
                            info!("Added '{}' to fallback chain", provider_name);
                            providers.push(provider);
                        }
                        Err(e) => {
                            warn!("Failed to initialize provider '{}': {}", provider_name, e);
                        }
                    }
                }
            } else {
                warn!(
                    "Provider '{}' in fallback order not found in configuration",
                    provider_name
                );
            }
        }

        if providers.is_empty() {
            return Err(ProviderError::NoneAvailable(
                "no providers in fallback configuration could be created".to_string(),
            ));
        }

        let policy = RetryPolicy::new(
            config.fallback.retry_attempts,
            Duration::from_millis(config.fallback.retry_delay_ms),
            Duration::from_millis(config.fallback.retry_delay_ms.saturating_mul(8)),
            true,
        );
        Ok(Self::with_providers(providers, policy))
    }

    pub fn with_providers(providers: Vec<Arc<dyn LlmProvider>>, policy: RetryPolicy) -> Self {
        Self { providers, policy }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl LlmProvider for FallbackProvider {
    fn provider_name(&self) -> &str {
        "fallback"
    }

    async fn complete(&self, instructions: &str, content: &str) -> Result<String, ProviderError> {
        let mut all_errors: Vec<String> = Vec::new();

        for provider in &self.providers {
            let label = format!("{} completion", provider.provider_name());
            let result = self
                .policy
                .run_if(&label, ProviderError::is_retryable, |_| {
                    provider.complete(instructions, content)
                })
                .await;

            match result {
                Ok(text) => {
                    info!("Completion served by {}", provider.provider_name());
                    return Ok(text);
                }
                Err(e) => {
                    warn!("Provider {} gave up: {}", provider.provider_name(), e);
                    all_errors.push(format!("{}: {}", provider.provider_name(), e));
                }
            }
        }

        Err(ProviderError::NoneAvailable(format!(
            "all providers failed ({})",
            all_errors.join("; ")
        )))
    }
}
