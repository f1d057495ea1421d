//! Constrained generation: one schema-bound call per enrichment.

use async_trait::async_trait;
use catalog_shared::{CatalogError, GeneratorConfig, Result};
use catalog_sources::build_client;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::schema::GenerationRequest;

/// A successful (2xx) generation response, body untouched.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// The generation collaborator.
///
/// Implementations return `Ok` only for a 2xx response. Non-2xx statuses and
/// transport failures surface as [`CatalogError::GenerationFailed`].
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<RawResponse>;
}

/// Generator backed by an OpenAI-compatible Responses API.
pub struct HttpGenerator {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: String,
}

impl HttpGenerator {
    pub fn new(config: &GeneratorConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = build_client(config.timeout_secs)?;

        let base = config.base_url.trim_end_matches('/');
        let endpoint = Url::parse(&format!("{base}/responses")).map_err(|e| {
            CatalogError::config(format!("invalid generator base_url '{base}': {e}"))
        })?;

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            api_key: api_key.into(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn request_body(&self, request: &GenerationRequest) -> serde_json::Value {
        json!({
            "model": self.model,
            "instructions": request.instructions,
            "input": request.input,
            "text": {
                "format": {
                    "type": "json_schema",
                    "name": request.schema_name,
                    "strict": true,
                    "schema": request.schema,
                }
            }
        })
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn generate(&self, request: &GenerationRequest) -> Result<RawResponse> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "generation transport failure");
                CatalogError::generation(None, "", format!("transport failure: {e}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            CatalogError::generation(Some(status.as_u16()), "", format!("unreadable body: {e}"))
        })?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "generation endpoint returned an error");
            return Err(CatalogError::generation(
                Some(status.as_u16()),
                &body,
                "endpoint returned an error status",
            ));
        }

        debug!(status = status.as_u16(), bytes = body.len(), "generation response received");
        Ok(RawResponse {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_shared::{EntityReference, EntityType};

    fn generator_for(server: &wiremock::MockServer) -> HttpGenerator {
        let config = GeneratorConfig {
            base_url: format!("{}/v1/", server.uri()),
            model: "test-model".into(),
            timeout_secs: 5,
            ..GeneratorConfig::default()
        };
        HttpGenerator::new(&config, "test-key").unwrap()
    }

    fn request() -> GenerationRequest {
        let reference = EntityReference::new("Jane Doe", EntityType::Person).unwrap();
        GenerationRequest::for_reference(&reference)
    }

    #[test]
    fn endpoint_appends_responses() {
        let config = GeneratorConfig::default();
        let generator = HttpGenerator::new(&config, "k").unwrap();
        assert_eq!(generator.endpoint().as_str(), "https://api.openai.com/v1/responses");
    }

    #[tokio::test]
    async fn sends_schema_bound_request() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/v1/responses"))
            .and(wiremock::matchers::header("authorization", "Bearer test-key"))
            .and(wiremock::matchers::body_partial_json(serde_json::json!({
                "model": "test-model",
                "text": {"format": {
                    "type": "json_schema",
                    "name": "catalog_entity_v1",
                    "strict": true
                }}
            })))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_string(r#"{"output_text":"{}"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let raw = generator_for(&server).generate(&request()).await.unwrap();
        assert_eq!(raw.status, 200);
        assert_eq!(raw.body, r#"{"output_text":"{}"}"#);
    }

    #[tokio::test]
    async fn error_status_is_generation_failure() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(
                wiremock::ResponseTemplate::new(500).set_body_string(r#"{"error":"boom"}"#),
            )
            .mount(&server)
            .await;

        let err = generator_for(&server).generate(&request()).await.unwrap_err();
        match err {
            CatalogError::GenerationFailed { status, body, .. } => {
                assert_eq!(status, Some(500));
                assert!(body.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_has_no_status() {
        let config = GeneratorConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
            ..GeneratorConfig::default()
        };
        let err = HttpGenerator::new(&config, "k")
            .unwrap()
            .generate(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::GenerationFailed { status: None, .. }));
    }

    #[test]
    fn body_never_requests_fact_fields() {
        let config = GeneratorConfig::default();
        let generator = HttpGenerator::new(&config, "k").unwrap();
        let body = generator.request_body(&request());
        let props = &body["text"]["format"]["schema"]["properties"];
        assert!(props["birthYear"].is_null());
        assert!(props["deathYear"].is_null());
        assert_eq!(props["type"]["enum"][0], "person");
    }
}
