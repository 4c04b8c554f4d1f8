use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};
use serde_json::Value;

use crate::reasoning::{
    error::{ReasoningError, malformed, rejected, transient},
    ports::ReasoningPort,
    types::ReasoningRequest,
};

/// Endpoint-agnostic HTTP assessor: POSTs the request as JSON and expects
/// the verdict payload back. Deadlines are enforced by the bridge, not here.
#[derive(Clone)]
pub struct HttpReasoningAdapter {
    client: Client,
    endpoint: String,
    auth_header: Option<String>,
}

impl HttpReasoningAdapter {
    pub fn new(endpoint: impl Into<String>, auth_header: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .pool_idle_timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client must build"),
            endpoint: endpoint.into(),
            auth_header,
        }
    }
}

#[async_trait]
impl ReasoningPort for HttpReasoningAdapter {
    async fn assess(&self, request: &ReasoningRequest) -> Result<Value, ReasoningError> {
        let mut builder = self
            .client
            .post(self.endpoint.trim_end_matches('/'))
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-task-id", request.task_id.clone())
            .json(request);
        if let Some(auth_header) = &self.auth_header {
            builder = builder.header(header::AUTHORIZATION, auth_header.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|err| transient(format!("assessor request failed: {err}")))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| malformed(format!("assessor answer is not JSON: {err}")))
    }
}

fn map_http_error(status: u16, body: &str) -> ReasoningError {
    let normalized_body = body.chars().take(240).collect::<String>();

    let mut err = if status == 408 || status == 429 {
        transient(format!("assessor returned status {status}"))
    } else if (400..500).contains(&status) {
        rejected(format!("assessor returned status {status}"))
    } else {
        transient(format!("assessor returned status {status}"))
    };

    if !normalized_body.is_empty() {
        err.message = format!("{}: {}", err.message, normalized_body);
    }

    err
}
