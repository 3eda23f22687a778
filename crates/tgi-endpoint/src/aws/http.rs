//! Signed HTTP transport shared by the AWS service clients.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use super::credentials::Credentials;
use super::signing::{sign, SigningParams};
use crate::errors::{EndpointError, EndpointResult};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Content type of the AWS JSON 1.1 protocol.
const AMZ_JSON: &str = "application/x-amz-json-1.1";

/// Content type of the AWS query protocol.
const FORM_URLENCODED: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// HTTP client that signs every request with SigV4.
#[derive(Clone)]
pub struct SignedClient {
    /// HTTP client.
    client: Client,
    /// Credentials used for signing.
    credentials: Credentials,
    /// AWS region.
    region: String,
}

impl SignedClient {
    /// Create a new signed client.
    ///
    /// `request_timeout` bounds each individual HTTP call, which matters for
    /// inference requests that can take longer than control-plane calls.
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created.
    pub fn new(
        credentials: Credentials,
        region: impl Into<String>,
        request_timeout: Option<Duration>,
    ) -> EndpointResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout.unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)))
            .build()?;

        Ok(Self {
            client,
            credentials,
            region: region.into(),
        })
    }

    /// AWS region this client signs for.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Credentials this client signs with.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Call an AWS JSON 1.1 operation (`X-Amz-Target: <target>`).
    pub async fn json_call<T, B>(
        &self,
        endpoint: &Url,
        service: &str,
        target: &str,
        body: &B,
    ) -> EndpointResult<T>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let body = serde_json::to_vec(body)?;
        debug!(url = %endpoint, target = %target, "AWS JSON request");

        let text = self
            .send(
                Method::POST,
                endpoint,
                service,
                &[("content-type", AMZ_JSON), ("x-amz-target", target)],
                body,
            )
            .await?;

        // Some operations (deletes) answer with an empty body.
        let text = if text.trim().is_empty() { "{}" } else { &text };
        parse_json(text)
    }

    /// Call an AWS query-protocol operation and return the raw XML body.
    pub async fn query_call(
        &self,
        endpoint: &Url,
        service: &str,
        region: &str,
        params: &[(&str, &str)],
    ) -> EndpointResult<String> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        debug!(url = %endpoint, service = %service, "AWS query request");

        self.send_in_region(
            Method::POST,
            endpoint,
            service,
            region,
            &[("content-type", FORM_URLENCODED)],
            body.into_bytes(),
        )
        .await
    }

    /// POST a JSON body to a REST-style endpoint and parse the JSON answer.
    pub async fn post_json<T, B>(&self, url: &Url, service: &str, body: &B) -> EndpointResult<T>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let body = serde_json::to_vec(body)?;
        debug!(url = %url, "POST request");

        let text = self
            .send(
                Method::POST,
                url,
                service,
                &[("content-type", "application/json"), ("accept", "application/json")],
                body,
            )
            .await?;
        parse_json(&text)
    }

    async fn send(
        &self,
        method: Method,
        url: &Url,
        service: &str,
        headers: &[(&str, &str)],
        body: Vec<u8>,
    ) -> EndpointResult<String> {
        let region = self.region.clone();
        self.send_in_region(method, url, service, &region, headers, body)
            .await
    }

    async fn send_in_region(
        &self,
        method: Method,
        url: &Url,
        service: &str,
        region: &str,
        headers: &[(&str, &str)],
        body: Vec<u8>,
    ) -> EndpointResult<String> {
        let params = SigningParams {
            credentials: &self.credentials,
            region,
            service,
            time: chrono::Utc::now(),
        };
        let signed = sign(&params, method.as_str(), url, headers, &body);

        let mut request = self.client.request(method, url.clone());
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        for (name, value) in signed.pairs() {
            request = request.header(name, value);
        }

        let response = request.body(body).send().await?;
        handle_response(response).await
    }
}

/// Handle API response, returning the body or a mapped error.
async fn handle_response(response: reqwest::Response) -> EndpointResult<String> {
    let status = response.status();
    let text = response.text().await?;

    if status.is_success() {
        Ok(text)
    } else {
        Err(map_error(status, &text))
    }
}

fn parse_json<T: DeserializeOwned>(text: &str) -> EndpointResult<T> {
    serde_json::from_str(text).map_err(|e| {
        warn!(error = %e, body = %text, "Failed to parse response");
        EndpointError::Serialization(e)
    })
}

/// Map an unsuccessful AWS response (JSON or XML) to an [`EndpointError`].
pub(crate) fn map_error(status: StatusCode, text: &str) -> EndpointError {
    let (code, message) = error_fields(text);

    let missing = {
        let lower = message.to_ascii_lowercase();
        lower.contains("could not find") || lower.contains("does not exist")
    };

    if status == StatusCode::NOT_FOUND
        || code.ends_with("ResourceNotFound")
        || code == "NoSuchEntity"
        || (status == StatusCode::BAD_REQUEST && missing)
    {
        EndpointError::NotFound(message)
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        EndpointError::Auth(if message.is_empty() { code } else { message })
    } else {
        EndpointError::Api {
            status: status.as_u16(),
            code,
            message,
        }
    }
}

/// Extract `(code, message)` from a JSON or XML AWS error body.
fn error_fields(text: &str) -> (String, String) {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
        let code = value
            .get("__type")
            .or_else(|| value.get("code"))
            .and_then(serde_json::Value::as_str)
            .map(|c| c.rsplit('#').next().unwrap_or(c).to_string())
            .unwrap_or_default();
        let message = value
            .get("message")
            .or_else(|| value.get("Message"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or(text)
            .to_string();
        return (code, message);
    }

    let code = xml_element(text, "Code").unwrap_or_default();
    let message = xml_element(text, "Message").unwrap_or_else(|| text.to_string());
    (code, message)
}

/// Text of the first `<tag>...</tag>` element in an XML body.
pub(crate) fn xml_element(xml: &str, tag: &str) -> Option<String> {
    static ELEMENTS: OnceLock<Regex> = OnceLock::new();
    let re = ELEMENTS.get_or_init(|| {
        Regex::new(r"(?s)<([A-Za-z]+)>([^<]*)</[A-Za-z]+>").expect("valid element regex")
    });

    re.captures_iter(xml)
        .find(|c| &c[1] == tag)
        .map(|c| c[2].trim().to_string())
}
