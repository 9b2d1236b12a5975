//! Assistant client tests
//!
//! Exercises the HTTP backend against a wiremock provider:
//! - configuration defaults and constants
//! - successful Messages API replies
//! - provider errors, timeouts and refused connections

use eldercare_monitor::ai::client::{
    AnthropicBackend, AssistantBackend, AssistantConfig, AssistantPrompt, ANTHROPIC_API_URL, ANTHROPIC_VERSION,
    DEFAULT_CACHE_TTL_SECS, DEFAULT_MAX_RESPONSE_LENGTH, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TIMEOUT_MS,
};
use eldercare_monitor::TransportError;
use serde_json::json;
use std::net::TcpListener;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock provider served from its own runtime; the blocking client stays on the test thread
struct Provider {
    server: MockServer,
    runtime: Runtime,
}

impl Provider {
    fn start() -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let server = runtime.block_on(MockServer::start());
        Self { server, runtime }
    }

    fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(&self.server));
    }

    fn uri(&self) -> String {
        self.server.uri()
    }

    fn request_bodies(&self) -> Vec<String> {
        self.runtime
            .block_on(self.server.received_requests())
            .unwrap_or_default()
            .into_iter()
            .map(|r| String::from_utf8_lossy(&r.body).into_owned())
            .collect()
    }
}

fn messages() -> wiremock::MockBuilder {
    Mock::given(method("POST")).and(path("/v1/messages"))
}

fn backend(endpoint: &str) -> AnthropicBackend {
    AnthropicBackend::new(AssistantConfig {
        endpoint: endpoint.to_string(),
        api_key: "test-key".to_string(),
        ..AssistantConfig::default()
    })
    .unwrap()
}

fn prompt() -> AssistantPrompt {
    AssistantPrompt {
        system: "You support caregivers.".to_string(),
        user: "Classification: WATCH".to_string(),
    }
}

// ============================================================================
// Configuration
// ============================================================================

mod config_tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = AssistantConfig::default();

        assert!(config.enabled);
        assert!(config.api_key.is_empty());
        assert_eq!(config.endpoint, ANTHROPIC_API_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.max_response_length, DEFAULT_MAX_RESPONSE_LENGTH);
        assert_eq!(config.cache_ttl_secs, DEFAULT_CACHE_TTL_SECS);
    }

    #[test]
    fn test_config_partial_json() {
        let config: AssistantConfig = serde_json::from_str(r#"{"model": "custom-model", "enabled": false}"#).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.model, "custom-model");
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn test_constants() {
        assert_eq!(ANTHROPIC_API_URL, "https://api.anthropic.com/v1/messages");
        assert_eq!(ANTHROPIC_VERSION, "2023-06-01");
        assert_eq!(DEFAULT_TIMEOUT_MS, 5000);
    }

    #[test]
    fn test_backend_creation_with_empty_api_key() {
        // the key is only checked by the provider
        let result = AnthropicBackend::new(AssistantConfig::default());
        assert!(result.is_ok());
    }
}

// ============================================================================
// HTTP exchanges
// ============================================================================

mod http_tests {
    use super::*;

    #[test]
    fn test_successful_reply() {
        let provider = Provider::start();
        provider.mount(
            messages()
                .and(header("x-api-key", "test-key"))
                .and(header("anthropic-version", ANTHROPIC_VERSION))
                .and(body_partial_json(json!({ "model": DEFAULT_MODEL })))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "content": [{"type": "text", "text": "Offer water and recheck in an hour."}]
                })))
                .expect(1),
        );

        let text = backend(&provider.uri())
            .generate(&prompt(), Duration::from_secs(5))
            .unwrap();
        assert_eq!(text, "Offer water and recheck in an hour.");

        let bodies = provider.request_bodies();
        assert_eq!(bodies.len(), 1);
        assert!(bodies[0].contains("Classification: WATCH"));
        assert!(bodies[0].contains("You support caregivers."));
    }

    #[test]
    fn test_provider_error() {
        let provider = Provider::start();
        provider.mount(messages().respond_with(
            ResponseTemplate::new(529).set_body_json(json!({
                "error": {"type": "overloaded_error", "message": "Overloaded"}
            })),
        ));

        let err = backend(&provider.uri())
            .generate(&prompt(), Duration::from_secs(5))
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::Provider {
                status: 529,
                message: "Overloaded".to_string()
            }
        );
    }

    #[test]
    fn test_undecodable_body() {
        let provider = Provider::start();
        provider.mount(messages().respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy error</html>")));

        let err = backend(&provider.uri())
            .generate(&prompt(), Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }

    #[test]
    fn test_slow_provider_times_out() {
        let provider = Provider::start();
        provider.mount(messages().respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"content": [{"type": "text", "text": "too late"}]}))
                .set_delay(Duration::from_secs(5)),
        ));

        let start = Instant::now();
        let err = backend(&provider.uri())
            .generate(&prompt(), Duration::from_millis(300))
            .unwrap_err();
        assert_eq!(err, TransportError::Timeout(Duration::from_millis(300)));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_refused_connection() {
        // reserve a free port, then close it
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = backend(&url).generate(&prompt(), Duration::from_secs(2)).unwrap_err();
        assert!(matches!(err, TransportError::Http(_)));
    }
}
