//! Gemini REST classifier

use crate::classify::{parse_classification, Classification, Classifier, ClassifyError, RetryPolicy};
use crate::config::ClassifierConfig;
use crate::ConfigError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Classifier backed by the Gemini `generateContent` endpoint
pub struct GeminiClassifier {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
    model: String,
    retry: RetryPolicy,
    industries: Vec<String>,
    company_sizes: Vec<String>,
    use_cases: Vec<String>,
}

impl GeminiClassifier {
    pub fn new(config: &ClassifierConfig, api_key: &str) -> Result<Self, ClassifyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            api_key: api_key.to_string(),
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            retry: RetryPolicy::new(
                config.max_attempts,
                Duration::from_millis(config.base_delay_ms),
            ),
            industries: config.industries.clone(),
            company_sizes: config.company_sizes.clone(),
            use_cases: config.use_cases.clone(),
        })
    }

    /// Reads the API key from the environment variable named in `config`
    pub fn api_key_from_env(config: &ClassifierConfig) -> Result<String, ConfigError> {
        std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingCredential(config.api_key_env.clone()))
    }

    fn headers(&self) -> Result<HeaderMap, ClassifyError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|e| ClassifyError::Api {
                status: 0,
                message: format!("invalid API key header: {}", e),
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn build_prompt(&self, text: &str, url: &str) -> String {
        let choices = |values: &[String], fallback: &str| {
            if values.is_empty() {
                fallback.to_string()
            } else {
                format!("Select ONE from: {}", values.join(", "))
            }
        };

        format!(
            r#"You are analyzing a customer reference/case study. Extract structured information from the text below.

REFERENCE URL: {url}

REFERENCE TEXT:
{text}

---

Return ONLY valid JSON (no markdown, no explanations). Use null for unknown scalar values and [] for unknown lists.

{{
  "customer_name": "Name of the customer company",
  "industry": "{industry}",
  "company_size": "{size}",
  "region": "Select ONE: North America, EMEA, APAC, LATAM, or Unknown",
  "country": "Specific country if mentioned, otherwise null",
  "use_cases": ["{use_cases}"],
  "outcomes": [
    {{
      "type": "performance | cost_savings | revenue_impact | efficiency | other",
      "description": "Brief description of outcome",
      "metric": "Specific metric if mentioned (e.g., '10x faster', '40% reduction')"
    }}
  ],
  "personas": [
    {{
      "title": "Job title of person quoted or featured",
      "name": "Person's name if mentioned",
      "seniority": "C-Level | VP | Director | Manager | Individual Contributor"
    }}
  ],
  "tech_stack": ["Other technologies mentioned (AWS, Azure, dbt, etc.)"],
  "quoted_text": "Most compelling customer quote from the reference (if any)"
}}"#,
            url = url,
            text = text,
            industry = choices(&self.industries, "Industry of the customer"),
            size = choices(&self.company_sizes, "Enterprise, Mid-Market, SMB, Startup or Unknown"),
            use_cases = if self.use_cases.is_empty() {
                "1-3 short use-case labels".to_string()
            } else {
                format!("Select 1-3 relevant from: {}", self.use_cases.join(", "))
            },
        )
    }

    /// Sends one generateContent request and returns the response text
    async fn generate(&self, prompt: &str) -> Result<String, ClassifyError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                temperature: 0.1,
            },
        };

        tracing::debug!(model = %self.model, "Gemini generateContent request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            let lowered = message.to_lowercase();
            if status.as_u16() == 429 || lowered.contains("quota") || lowered.contains("rate limit")
            {
                return Err(ClassifyError::RateLimited(format!("{}: {}", status, message)));
            }
            return Err(ClassifyError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: GenerateResponse = response.json().await?;
        let text: String = body
            .candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .map(|part| part.text)
            .collect();

        if text.trim().is_empty() {
            return Err(ClassifyError::Parse("empty response".to_string()));
        }
        Ok(text)
    }
}

#[async_trait]
impl Classifier for GeminiClassifier {
    async fn classify(
        &self,
        text: &str,
        url: &str,
    ) -> Result<Option<Classification>, ClassifyError> {
        let prompt = self.build_prompt(text, url);
        let prompt = prompt.as_str();

        let result = self
            .retry
            .run(
                |attempt| async move {
                    tracing::debug!(attempt = attempt + 1, "Classifying {}", url);
                    let response = self.generate(prompt).await?;
                    parse_classification(&response)
                },
                |_| true,
            )
            .await;

        match result {
            Ok(classification) => Ok(Some(classification)),
            Err(e) if e.is_rate_limit() => Err(e),
            Err(e) => {
                tracing::warn!("Giving up on {}: {}", url, e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> ClassifierConfig {
        ClassifierConfig {
            base_url: base_url.to_string(),
            base_delay_ms: 1,
            ..Default::default()
        }
    }

    fn gemini_body(text: &str) -> serde_json::Value {
        serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": text }] } }]
        })
    }

    #[tokio::test]
    async fn test_classify_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body(
                "```json\n{\"customer_name\": \"Acme\", \"industry\": \"Retail\"}\n```",
            )))
            .mount(&server)
            .await;

        let classifier = GeminiClassifier::new(&config(&server.uri()), "test-key").unwrap();
        let result = classifier
            .classify("Acme sells things.", "https://v.example/customers/acme")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.customer_name.as_deref(), Some("Acme"));
        assert_eq!(result.industry.as_deref(), Some("Retail"));
    }

    #[tokio::test]
    async fn test_unparseable_output_returns_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body("no idea")))
            .expect(3)
            .mount(&server)
            .await;

        let classifier = GeminiClassifier::new(&config(&server.uri()), "test-key").unwrap();
        let result = classifier.classify("text", "https://v.example/x").await.unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_persistent_rate_limit_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Resource has been exhausted"))
            .expect(3)
            .mount(&server)
            .await;

        let classifier = GeminiClassifier::new(&config(&server.uri()), "test-key").unwrap();
        let result = classifier.classify("text", "https://v.example/x").await;

        assert!(matches!(result, Err(ClassifyError::RateLimited(_))));
    }

    #[tokio::test]
    async fn test_recovers_after_transient_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(gemini_body("{\"customer_name\": \"Acme\"}")),
            )
            .mount(&server)
            .await;

        let classifier = GeminiClassifier::new(&config(&server.uri()), "test-key").unwrap();
        let result = classifier.classify("text", "https://v.example/x").await.unwrap();

        assert!(result.is_some());
    }

    #[test]
    fn test_prompt_lists_taxonomies() {
        let mut cfg = config("https://example.invalid");
        cfg.industries = vec!["Retail".to_string(), "Finance".to_string()];
        let classifier = GeminiClassifier::new(&cfg, "k").unwrap();

        let prompt = classifier.build_prompt("body", "https://v.example/x");
        assert!(prompt.contains("Select ONE from: Retail, Finance"));
        assert!(prompt.contains("REFERENCE URL: https://v.example/x"));
    }

    #[test]
    fn test_missing_api_key() {
        let cfg = ClassifierConfig {
            api_key_env: "STORY_HARVEST_TEST_UNSET_KEY".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            GeminiClassifier::api_key_from_env(&cfg),
            Err(ConfigError::MissingCredential(_))
        ));
    }
}
