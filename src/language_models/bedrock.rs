//! AWS Bedrock clients for base (Mistral prompt format) and chat (Anthropic
//! messages format) models.
//!
//! Requests go to `POST {endpoint}/model/{model_id}/invoke` and are signed with
//! AWS Signature Version 4. Credentials come from [`BedrockConfig::from_env`] or
//! are passed in explicitly.

use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use reqwest::{header::HeaderMap, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{LLMError, ModelFamily, ModelParams, ProviderClient, ProviderReply};

const SERVICE: &str = "bedrock";
const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
const INPUT_TOKENS_HEADER: &str = "x-amzn-bedrock-input-token-count";
const OUTPUT_TOKENS_HEADER: &str = "x-amzn-bedrock-output-token-count";

#[derive(Debug, Clone)]
pub struct BedrockConfig {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: SecretString,
    pub session_token: Option<SecretString>,
    /// Custom endpoint URL (VPC endpoints, tests).
    pub endpoint_url: Option<String>,
    pub timeout: Duration,
    pub max_tokens: u32,
}

impl BedrockConfig {
    pub fn new<K: Into<String>, S: Into<String>>(access_key_id: K, secret_access_key: S) -> Self {
        Self {
            region: "us-east-1".to_string(),
            access_key_id: access_key_id.into(),
            secret_access_key: SecretString::from(secret_access_key.into()),
            session_token: None,
            endpoint_url: None,
            timeout: Duration::from_secs(120),
            max_tokens: 4096,
        }
    }

    /// Reads `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_SESSION_TOKEN`,
    /// `AWS_REGION` (or `AWS_DEFAULT_REGION`) and `BEDROCK_ENDPOINT_URL`.
    pub fn from_env() -> Result<Self, LLMError> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| LLMError::CredentialsError("AWS_ACCESS_KEY_ID is not set".into()))?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| LLMError::CredentialsError("AWS_SECRET_ACCESS_KEY is not set".into()))?;

        let mut config = Self::new(access_key_id, secret_access_key);
        if let Ok(token) = std::env::var("AWS_SESSION_TOKEN") {
            config = config.with_session_token(token);
        }
        if let Ok(region) =
            std::env::var("AWS_REGION").or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
        {
            config = config.with_region(region);
        }
        if let Ok(endpoint) = std::env::var("BEDROCK_ENDPOINT_URL") {
            config = config.with_endpoint_url(endpoint);
        }
        Ok(config)
    }

    pub fn with_region<S: Into<String>>(mut self, region: S) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_session_token<S: Into<String>>(mut self, token: S) -> Self {
        self.session_token = Some(SecretString::from(token.into()));
        self
    }

    pub fn with_endpoint_url<S: Into<String>>(mut self, url: S) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn base_url(&self) -> String {
        self.endpoint_url
            .clone()
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("https://bedrock-runtime.{}.amazonaws.com", self.region))
    }

    /// Invoke URL with the model id percent-encoded (ids contain `:`).
    pub fn invoke_url(&self, model_id: &str) -> String {
        format!(
            "{}/model/{}/invoke",
            self.base_url(),
            urlencoding::encode(model_id)
        )
    }
}

/// Signed HTTP transport shared by both Bedrock clients.
#[derive(Debug, Clone)]
struct BedrockTransport {
    config: BedrockConfig,
    client: Client,
}

impl BedrockTransport {
    fn new(config: BedrockConfig) -> Result<Self, LLMError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    async fn invoke_model(&self, model_id: &str, body: &Value) -> Result<(Value, HeaderMap), LLMError> {
        let url = self.config.invoke_url(model_id);
        let body_bytes = serde_json::to_vec(body)?;

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        headers.insert("accept".to_string(), "application/json".to_string());
        sign_request(&self.config, "POST", &url, &body_bytes, &mut headers, chrono::Utc::now())?;

        let mut request = self.client.post(&url);
        for (key, value) in headers.iter().filter(|(k, _)| k.as_str() != "host") {
            request = request.header(key.as_str(), value.as_str());
        }

        log::debug!("Invoking Bedrock model {}", model_id);
        let response = request.body(body_bytes).send().await?;
        let status = response.status();
        let response_headers = response.headers().clone();
        let bytes = response.bytes().await?;

        if status.as_u16() == 429 {
            return Err(LLMError::RateLimited(SERVICE.to_string()));
        }
        if !status.is_success() {
            let message = serde_json::from_slice::<BedrockErrorBody>(&bytes)
                .ok()
                .and_then(|e| e.message.or(e.message_alt))
                .unwrap_or_else(|| String::from_utf8_lossy(&bytes).to_string());
            return Err(LLMError::ProviderError {
                provider: SERVICE.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let value = serde_json::from_slice(&bytes)
            .map_err(|e| LLMError::ParsingError(format!("invalid Bedrock response: {}", e)))?;
        Ok((value, response_headers))
    }
}

/// Bedrock base models, prompted with the Mistral instruction format.
#[derive(Debug, Clone)]
pub struct BedrockBase {
    transport: BedrockTransport,
}

impl BedrockBase {
    pub fn new(config: BedrockConfig) -> Result<Self, LLMError> {
        Ok(Self {
            transport: BedrockTransport::new(config)?,
        })
    }
}

#[async_trait]
impl ProviderClient for BedrockBase {
    fn family(&self) -> ModelFamily {
        ModelFamily::BedrockBase
    }

    async fn invoke(
        &self,
        model_id: &str,
        prompt: &str,
        params: &ModelParams,
    ) -> Result<ProviderReply, LLMError> {
        let body = json!({
            "prompt": format!("<s>[INST] {} [/INST]", prompt),
            "max_tokens": self.transport.config.max_tokens,
            "temperature": params.temperature,
        });
        let (value, headers) = self.transport.invoke_model(model_id, &body).await?;
        let response: BedrockTextResponse = serde_json::from_value(value)
            .map_err(|e| LLMError::ParsingError(format!("invalid Mistral response: {}", e)))?;
        let output = response
            .outputs
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::ParsingError("no outputs in Mistral response".into()))?;

        let mut metadata = json!({
            "model_id": model_id,
            "stop_reason": output.stop_reason,
        });
        if let (Some(input), Some(output)) = (
            header_count(&headers, INPUT_TOKENS_HEADER),
            header_count(&headers, OUTPUT_TOKENS_HEADER),
        ) {
            metadata["invocation_metrics"] = json!({
                "input_token_count": input,
                "output_token_count": output,
            });
        }

        Ok(ProviderReply {
            content: output.text,
            response_metadata: metadata,
        })
    }
}

/// Bedrock chat models, called with the Anthropic messages body.
#[derive(Debug, Clone)]
pub struct BedrockChat {
    transport: BedrockTransport,
}

impl BedrockChat {
    pub fn new(config: BedrockConfig) -> Result<Self, LLMError> {
        Ok(Self {
            transport: BedrockTransport::new(config)?,
        })
    }
}

#[async_trait]
impl ProviderClient for BedrockChat {
    fn family(&self) -> ModelFamily {
        ModelFamily::BedrockChat
    }

    async fn invoke(
        &self,
        model_id: &str,
        prompt: &str,
        params: &ModelParams,
    ) -> Result<ProviderReply, LLMError> {
        let body = json!({
            "anthropic_version": ANTHROPIC_VERSION,
            "max_tokens": self.transport.config.max_tokens,
            "temperature": params.temperature,
            "messages": [
                {"role": "user", "content": [{"type": "text", "text": prompt}]}
            ],
        });
        let (value, _) = self.transport.invoke_model(model_id, &body).await?;
        let response: BedrockClaudeResponse = serde_json::from_value(value)
            .map_err(|e| LLMError::ParsingError(format!("invalid Claude response: {}", e)))?;

        let content = response
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        Ok(ProviderReply {
            content,
            response_metadata: json!({
                "id": response.id,
                "model_id": model_id,
                "stop_reason": response.stop_reason,
                "usage": {
                    "input_tokens": response.usage.input_tokens,
                    "output_tokens": response.usage.output_tokens,
                },
            }),
        })
    }
}

fn header_count(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Sign a request with AWS Signature Version 4, adding `host`, `x-amz-date`,
/// `x-amz-content-sha256`, the optional session token and `authorization` to `headers`.
fn sign_request(
    config: &BedrockConfig,
    method: &str,
    uri: &str,
    body: &[u8],
    headers: &mut BTreeMap<String, String>,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(), LLMError> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = now.format("%Y%m%d").to_string();
    let region = &config.region;

    let url = url::Url::parse(uri).map_err(|e| LLMError::OtherError(format!("Invalid URL: {}", e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| LLMError::OtherError("URL has no host".into()))?;
    let host = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    // Non-S3 services sign the already-encoded path encoded once more.
    let canonical_uri = url
        .path()
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");

    let payload_hash = hex::encode(sha256_hash(body));

    headers.insert("host".to_string(), host);
    headers.insert("x-amz-date".to_string(), amz_date.clone());
    headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());
    if let Some(token) = &config.session_token {
        headers.insert(
            "x-amz-security-token".to_string(),
            token.expose_secret().to_string(),
        );
    }

    let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");
    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method,
        canonical_uri,
        url.query().unwrap_or_default(),
        canonical_headers,
        signed_headers,
        payload_hash
    );

    let algorithm = "AWS4-HMAC-SHA256";
    let credential_scope = format!("{}/{}/{}/aws4_request", date_stamp, region, SERVICE);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        algorithm,
        amz_date,
        credential_scope,
        hex::encode(sha256_hash(canonical_request.as_bytes()))
    );

    let secret = format!("AWS4{}", config.secret_access_key.expose_secret());
    let k_date = hmac_sha256(secret.as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, SERVICE.as_bytes())?;
    let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
    let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?);

    headers.insert(
        "authorization".to_string(),
        format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            algorithm, config.access_key_id, credential_scope, signed_headers, signature
        ),
    );

    Ok(())
}

fn sha256_hash(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32], LLMError> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| LLMError::CredentialsError(format!("invalid signing key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

#[derive(Debug, Deserialize)]
struct BedrockErrorBody {
    message: Option<String>,
    #[serde(rename = "Message")]
    message_alt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BedrockTextResponse {
    outputs: Vec<BedrockTextOutput>,
}

#[derive(Debug, Deserialize)]
struct BedrockTextOutput {
    text: String,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BedrockClaudeResponse {
    id: Option<String>,
    content: Vec<ClaudeContentBlock>,
    stop_reason: Option<String>,
    usage: ClaudeUsage,
}

#[derive(Debug, Deserialize)]
struct ClaudeContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaudeUsage {
    input_tokens: u64,
    output_tokens: u64,
}
