//! Ordered fallback chains of conversion providers.

use crate::converter::ConvertedOutput;
use crate::error::ConvertError;

/// Result of one provider attempt.
#[derive(Debug)]
pub enum ProviderOutcome {
    Converted(Vec<ConvertedOutput>),
    /// The provider cannot run here (feature off, tool missing, flag unset).
    Unavailable(String),
    Failed(String),
}

impl ProviderOutcome {
    pub fn from_result(result: Result<Vec<ConvertedOutput>, ConvertError>) -> Self {
        match result {
            Ok(outputs) if outputs.is_empty() => Self::Failed("produced no output".to_string()),
            Ok(outputs) => Self::Converted(outputs),
            Err(ConvertError::Unavailable(reason)) => Self::Unavailable(reason),
            Err(e) => Self::Failed(e.to_string()),
        }
    }
}

pub trait ConversionProvider<I: ?Sized>: Send + Sync {
    fn name(&self) -> &'static str;

    fn attempt(&self, input: &I) -> ProviderOutcome;
}

pub struct ProviderChain<I: ?Sized> {
    providers: Vec<Box<dyn ConversionProvider<I>>>,
}

impl<I: ?Sized> ProviderChain<I> {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    pub fn with(mut self, provider: impl ConversionProvider<I> + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Tries each provider in order. The first conversion wins; otherwise
    /// every reason is reported, in order, joined by `"; "`.
    pub fn run(&self, input: &I) -> Result<Vec<ConvertedOutput>, ConvertError> {
        let mut reasons = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            match provider.attempt(input) {
                ProviderOutcome::Converted(outputs) => {
                    tracing::debug!(provider = provider.name(), "Provider converted input");
                    return Ok(outputs);
                }
                ProviderOutcome::Unavailable(reason) => {
                    tracing::debug!(provider = provider.name(), %reason, "Provider unavailable");
                    reasons.push(format!("{}: {}", provider.name(), reason));
                }
                ProviderOutcome::Failed(reason) => {
                    tracing::warn!(provider = provider.name(), %reason, "Provider failed");
                    reasons.push(format!("{}: {}", provider.name(), reason));
                }
            }
        }

        if reasons.is_empty() {
            return Err(ConvertError::ProvidersExhausted(
                "no providers configured".to_string(),
            ));
        }

        Err(ConvertError::ProvidersExhausted(reasons.join("; ")))
    }
}

impl<I: ?Sized> Default for ProviderChain<I> {
    fn default() -> Self {
        Self::new()
    }
}
