//! Language model providers for Mnemo.
//!
//! All providers implement the `mnemo_core::Provider` trait. The engine
//! never depends on a concrete provider.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use mnemo_config::AppConfig;
use mnemo_core::ProviderError;

/// Build the configured provider.
pub fn from_config(config: &AppConfig) -> Result<OpenAiCompatProvider, ProviderError> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        ProviderError::NotConfigured(
            "no API key; set api_key in config.toml or MNEMO_API_KEY".into(),
        )
    })?;
    OpenAiCompatProvider::new(
        "openai",
        &config.provider.api_url,
        api_key,
        std::time::Duration::from_secs(config.provider.timeout_secs),
    )
}
