use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Broad category of a Graph API failure, derived from the platform error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphErrorKind {
    RateLimited,
    AuthExpired,
    PermissionDenied,
    InvalidParameter,
    Other,
}

impl GraphErrorKind {
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(4 | 17 | 32 | 613) => Self::RateLimited,
            Some(102 | 190) => Self::AuthExpired,
            Some(10) | Some(200..=299) => Self::PermissionDenied,
            Some(100) => Self::InvalidParameter,
            _ => Self::Other,
        }
    }
}

#[derive(Error, Debug)]
pub enum FacebookApiError {
    #[error("API request failed: {0}")]
    RequestFailed(String),
    #[error("{message}")]
    Graph {
        message: String,
        code: Option<i64>,
        subcode: Option<i64>,
        user_title: Option<String>,
        user_message: Option<String>,
        kind: GraphErrorKind,
    },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl FacebookApiError {
    pub fn message(&self) -> String {
        match self {
            Self::Graph { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Graph { code, .. } => *code,
            _ => None,
        }
    }

    pub fn kind(&self) -> GraphErrorKind {
        match self {
            Self::Graph { kind, .. } => *kind,
            _ => GraphErrorKind::Other,
        }
    }

    /// The platform's own user-facing explanation, when it sent one.
    pub fn user_detail(&self) -> Option<&str> {
        match self {
            Self::Graph {
                user_message,
                user_title,
                ..
            } => user_message
                .as_deref()
                .or(user_title.as_deref())
                .filter(|s| !s.trim().is_empty()),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphErrorEnvelope {
    error: GraphErrorBody,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    #[serde(default)]
    message: String,
    code: Option<i64>,
    error_subcode: Option<i64>,
    error_user_title: Option<String>,
    error_user_msg: Option<String>,
}

impl From<GraphErrorBody> for FacebookApiError {
    fn from(body: GraphErrorBody) -> Self {
        FacebookApiError::Graph {
            kind: GraphErrorKind::from_code(body.code),
            message: body.message,
            code: body.code,
            subcode: body.error_subcode,
            user_title: body.error_user_title,
            user_message: body.error_user_msg,
        }
    }
}

/// Parses a non-success Graph response body into a typed error.
pub fn parse_error_body(status: u16, body: &str) -> FacebookApiError {
    match serde_json::from_str::<GraphErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.into(),
        Err(_) => FacebookApiError::Graph {
            message: format!("HTTP {status}: {body}"),
            code: None,
            subcode: None,
            user_title: None,
            user_message: None,
            kind: GraphErrorKind::Other,
        },
    }
}

/// Authenticated request primitive against the Graph API.
#[async_trait]
pub trait GraphApi: Send + Sync {
    /// Creates an object on `edge` of `node_id`, returning the response body.
    async fn create(
        &self,
        access_token: &str,
        node_id: &str,
        edge: &str,
        payload: &Value,
    ) -> Result<Value, FacebookApiError>;

    /// Reads `fields` of a single node.
    async fn fetch(
        &self,
        access_token: &str,
        node_id: &str,
        fields: &str,
    ) -> Result<Value, FacebookApiError>;
}

pub struct FacebookAPI {
    client: Client,
    base_url: String,
}

impl FacebookAPI {
    pub fn new(base_url: &Url, api_version: &str, timeout: Duration) -> Result<Self, FacebookApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FacebookApiError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url: format!("{}/{}", base_url.as_str().trim_end_matches('/'), api_version),
        })
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, FacebookApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(parse_error_body(status.as_u16(), &body));
        }

        response
            .json()
            .await
            .map_err(|e| FacebookApiError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl GraphApi for FacebookAPI {
    async fn create(
        &self,
        access_token: &str,
        node_id: &str,
        edge: &str,
        payload: &Value,
    ) -> Result<Value, FacebookApiError> {
        let url = format!("{}/{}/{}", self.base_url, node_id, edge);
        debug!(node_id, edge, "graph create");

        let response = self
            .client
            .post(&url)
            .query(&[("access_token", access_token)])
            .json(payload)
            .send()
            .await
            .map_err(|e| FacebookApiError::RequestFailed(e.to_string()))?;

        Self::read_json(response).await
    }

    async fn fetch(
        &self,
        access_token: &str,
        node_id: &str,
        fields: &str,
    ) -> Result<Value, FacebookApiError> {
        let url = format!("{}/{}", self.base_url, node_id);
        debug!(node_id, fields, "graph fetch");

        let response = self
            .client
            .get(&url)
            .query(&[("access_token", access_token), ("fields", fields)])
            .send()
            .await
            .map_err(|e| FacebookApiError::RequestFailed(e.to_string()))?;

        Self::read_json(response).await
    }
}

/// Reads the `id` of a newly created object.
pub fn created_id(response: &Value) -> Result<String, FacebookApiError> {
    match &response["id"] {
        Value::String(id) if !id.is_empty() => Ok(id.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(FacebookApiError::InvalidResponse(format!(
            "response has no object id: {response}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn error_body_is_typed() {
        let body = r#"{"error":{"message":"(#100) Invalid parameter","type":"OAuthException","code":100,"error_subcode":1885272,"error_user_title":"Budget Too Low","error_user_msg":"Your budget is too low.","fbtrace_id":"Ab"}}"#;
        let err = parse_error_body(400, body);

        assert_eq!(err.message(), "(#100) Invalid parameter");
        assert_eq!(err.code(), Some(100));
        assert_eq!(err.kind(), GraphErrorKind::InvalidParameter);
        assert_eq!(err.user_detail(), Some("Your budget is too low."));
    }

    #[test]
    fn non_json_error_keeps_status() {
        let err = parse_error_body(502, "Bad Gateway");
        assert_eq!(err.message(), "HTTP 502: Bad Gateway");
        assert_eq!(err.code(), None);
        assert_eq!(err.kind(), GraphErrorKind::Other);
    }

    #[test]
    fn error_kinds_follow_codes() {
        assert_eq!(GraphErrorKind::from_code(Some(17)), GraphErrorKind::RateLimited);
        assert_eq!(GraphErrorKind::from_code(Some(190)), GraphErrorKind::AuthExpired);
        assert_eq!(GraphErrorKind::from_code(Some(200)), GraphErrorKind::PermissionDenied);
        assert_eq!(GraphErrorKind::from_code(Some(1)), GraphErrorKind::Other);
        assert_eq!(GraphErrorKind::from_code(None), GraphErrorKind::Other);
    }

    #[test]
    fn created_id_reads_string_or_number() {
        assert_eq!(created_id(&json!({"id": "120200"})).unwrap(), "120200");
        assert_eq!(created_id(&json!({"id": 42})).unwrap(), "42");
        assert!(created_id(&json!({"success": true})).is_err());
    }

    #[test]
    fn base_url_joins_version() {
        let api = FacebookAPI::new(
            &Url::parse("https://graph.facebook.com").unwrap(),
            "v20.0",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(api.base_url, "https://graph.facebook.com/v20.0");
    }
}
