//! Generic HTTP-API executor
//!
//! Sends one request and stores the response as the job's result document:
//!
//! ```json
//! {"success": true, "status": 200, "data": {...}, "error": ""}
//! ```
//!
//! `data` is the parsed body when it is JSON, otherwise the raw text.

use async_trait::async_trait;
use ferrule_core::params;
use ferrule_core::domain::log::LogSink;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};

use super::Executor;
use crate::context::ExecutionContext;

/// Executor issuing a single HTTP request
pub struct HttpExecutor {
    client: Client,
}

impl HttpExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn build(&self, ctx: &ExecutionContext<'_>) -> Result<RequestBuilder, String> {
        let url = ctx.param("url").ok_or("No url defined")?;
        let method = ctx.param("method").unwrap_or_else(|| "GET".to_string());
        let method = Method::from_bytes(method.to_uppercase().as_bytes())
            .map_err(|_| format!("Invalid HTTP method '{}'", method))?;

        let mut request = self.client.request(method, &url);
        if let Some(headers) = params::object(ctx.product, "headers") {
            for (name, value) in headers {
                request = request.header(name.as_str(), ctx.resolve(&params::to_text(value)));
            }
        }
        request = match ctx.product.get("body") {
            None | Some(Value::Null) => request,
            Some(Value::String(body)) => request.body(ctx.resolve(body)),
            Some(body) => request.json(&ctx.resolve_value(body)),
        };
        if let Some(timeout) = ctx.config.job_timeout {
            request = request.timeout(timeout);
        }
        Ok(request)
    }
}

/// Body as JSON if it parses, else as text
/// Response body as text; a failed read is logged and yields ""
pub(crate) async fn read_body(response: Response, log: &dyn LogSink) -> String {
    match response.text().await {
        Ok(body) => body,
        Err(e) => {
            log.warning(&format!("Failed to read response body: {}", e));
            String::new()
        }
    }
}

pub(crate) fn parse_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

/// Result document for a completed HTTP exchange
pub(crate) fn response_document(status: StatusCode, data: Value) -> Value {
    let success = status.is_success();
    let error = if success {
        String::new()
    } else {
        format!("HTTP status {}", status)
    };
    json!({
        "success": success,
        "status": status.as_u16(),
        "data": data,
        "error": error,
    })
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(&self, ctx: &ExecutionContext<'_>) -> i32 {
        let request = match self.build(ctx) {
            Ok(request) => request,
            Err(e) => {
                ctx.log.error(&format!("http executor: {}", e));
                return 1;
            }
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                ctx.log.error(&format!("HTTP request failed: {}", e));
                ctx.store_result(&json!({
                    "success": false,
                    "status": Value::Null,
                    "data": Value::Null,
                    "error": e.to_string(),
                }));
                return 1;
            }
        };

        let status = response.status();
        let body = read_body(response, &*ctx.log).await;
        ctx.log.info(&format!("HTTP status: {}", status));
        ctx.log.debug(&body);

        ctx.store_result(&response_document(status, parse_body(&body)));
        if status.is_success() { 0 } else { 1 }
    }
}
