use std::sync::Arc;

use cf_domain::config::{AgentProviderKind, Config};
use cf_domain::error::{Error, Result};

use crate::claude::ClaudeProvider;
use crate::openai::OpenAiProvider;
use crate::traits::LlmProvider;

/// Build the configured agent provider. Missing credentials surface as a
/// `no_credentials` error naming the key the user has to set.
pub fn provider_from_config(config: &Config) -> Result<Arc<dyn LlmProvider>> {
    match config.agent_provider {
        AgentProviderKind::Openai => {
            let key = config
                .openai_key
                .clone()
                .ok_or_else(|| Error::NoCredentials("openaiKey / OPENAI_API_KEY".into()))?;
            Ok(Arc::new(OpenAiProvider::new(key, config.agent_model.clone())?))
        }
        AgentProviderKind::Claude => {
            let key = config
                .claude_api_key
                .clone()
                .ok_or_else(|| Error::NoCredentials("claudeApiKey / CLAUDE_API_KEY".into()))?;
            Ok(Arc::new(ClaudeProvider::new(key, config.agent_model.clone())?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_a_credentials_error() {
        let config = Config::default();
        // Only meaningful when the environment does not inject a key.
        if config.openai_key.is_none() {
            let err = match provider_from_config(&config) {
                Ok(_) => panic!("expected an error"),
                Err(e) => e,
            };
            assert_eq!(err.kind(), "no_credentials");
        }
    }

    #[test]
    fn claude_provider_resolves_when_key_present() {
        let mut config = Config::default();
        config.agent_provider = AgentProviderKind::Claude;
        config.claude_api_key = Some("sk-ant-test".into());
        let provider = provider_from_config(&config).unwrap();
        assert_eq!(provider.provider_id(), "claude");
    }
}
