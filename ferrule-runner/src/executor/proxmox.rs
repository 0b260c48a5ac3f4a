//! Proxmox VE executor
//!
//! Issues one call against the Proxmox VE REST API, authenticated with an
//! API token. Routes:
//! - list (`list_mode`):        GET    /nodes/{node}/{type}
//! - `create`:                  POST   /nodes/{node}/{type}
//! - `delete`:                  DELETE /nodes/{node}/{type}/{vmid}
//! - read-only commands:        GET    /nodes/{node}/{type}/{vmid}/{command}
//! - every other command:       POST   /nodes/{node}/{type}/{vmid}/{command}
//!
//! `api_params` become the query string for GET/DELETE and a JSON body for
//! POST. Job kinds such as `lxc_start` fill these fields in through the
//! shortcut table before the executor runs.

use async_trait::async_trait;
use ferrule_core::params;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::{Map, Value, json};

use super::Executor;
use super::http::{parse_body, read_body, response_document};
use crate::context::ExecutionContext;

/// Commands answered with GET
const READ_COMMANDS: &[&str] = &["status/current", "config", "rrddata", "firewall"];

/// Executor for the Proxmox VE API
pub struct ProxmoxExecutor {
    client: Client,
}

/// Resolved parameters of one API call
#[derive(Debug, Clone, PartialEq)]
pub struct ProxmoxCall {
    pub host: String,
    pub node: String,
    pub guest_type: String,
    pub vmid: Option<String>,
    pub token_id: String,
    pub token_secret: String,
    pub command: String,
    pub list_mode: bool,
    pub insecure: bool,
    pub params: Map<String, Value>,
}

impl ProxmoxCall {
    /// Read and resolve the call parameters from the job
    pub fn from_context(ctx: &ExecutionContext<'_>) -> Result<Self, String> {
        let mut missing = Vec::new();
        let mut required = |key: &'static str| {
            ctx.param(key).unwrap_or_else(|| {
                missing.push(key);
                String::new()
            })
        };
        let host = required("host");
        let node = required("node");
        let guest_type = required("type");
        let token_id = required("token_id");
        let token_secret = required("token_secret");

        let list_mode = params::flag(ctx.product, "list_mode");
        let command = ctx.param("api_command").unwrap_or_default();
        if command.is_empty() && !list_mode {
            missing.push("api_command");
        }
        if !missing.is_empty() {
            return Err(format!("Missing Proxmox parameters: {}", missing.join(", ")));
        }

        let params = match ctx.product.get("api_params") {
            Some(Value::Object(map)) => match ctx.resolve_value(&Value::Object(map.clone())) {
                Value::Object(resolved) => resolved,
                _ => Map::new(),
            },
            _ => Map::new(),
        };

        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            node,
            guest_type,
            vmid: ctx.param("vmid"),
            token_id,
            token_secret,
            command,
            list_mode,
            insecure: params::flag(ctx.product, "insecure"),
            params,
        })
    }

    /// HTTP method and URL for this call
    pub fn route(&self) -> (Method, String) {
        let base = format!(
            "{}/api2/json/nodes/{}/{}",
            self.host, self.node, self.guest_type
        );

        if self.list_mode {
            return (Method::GET, base);
        }
        if self.command == "create" {
            return (Method::POST, base);
        }

        let Some(vmid) = &self.vmid else {
            return (self.command_method(), format!("{}/{}", base, self.command));
        };
        if self.command == "delete" {
            return (Method::DELETE, format!("{}/{}", base, vmid));
        }
        (
            self.command_method(),
            format!("{}/{}/{}", base, vmid, self.command),
        )
    }

    fn command_method(&self) -> Method {
        if READ_COMMANDS.contains(&self.command.as_str()) {
            Method::GET
        } else {
            Method::POST
        }
    }

    /// `Authorization` header value for API token auth
    pub fn auth_header(&self) -> String {
        format!("PVEAPIToken={}={}", self.token_id, self.token_secret)
    }

    fn request(&self, client: &Client) -> reqwest::Result<RequestBuilder> {
        let (method, url) = self.route();
        let client = if self.insecure {
            Client::builder().danger_accept_invalid_certs(true).build()?
        } else {
            client.clone()
        };

        let mut request = client
            .request(method.clone(), &url)
            .header("Authorization", self.auth_header());
        if !self.params.is_empty() {
            request = if method == Method::POST {
                request.json(&self.params)
            } else {
                let query: Vec<(String, String)> = self
                    .params
                    .iter()
                    .map(|(k, v)| (k.clone(), params::to_text(v)))
                    .collect();
                request.query(&query)
            };
        }
        Ok(request)
    }
}

impl ProxmoxExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Strip the `{"data": ...}` envelope Proxmox wraps every answer in
fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[async_trait]
impl Executor for ProxmoxExecutor {
    async fn execute(&self, ctx: &ExecutionContext<'_>) -> i32 {
        let call = match ProxmoxCall::from_context(ctx) {
            Ok(call) => call,
            Err(e) => {
                ctx.log.error(&e);
                return 1;
            }
        };

        let (method, url) = call.route();
        ctx.log.info(&format!("Proxmox API: {} {}", method, url));

        let mut request = match call.request(&self.client) {
            Ok(request) => request,
            Err(e) => {
                ctx.log.error(&format!("Failed to build Proxmox request: {}", e));
                return 1;
            }
        };
        if let Some(timeout) = ctx.config.job_timeout {
            request = request.timeout(timeout);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                ctx.log.error(&format!("Proxmox API error: {}", e));
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
        ctx.log.info(&format!("Proxmox API status: {}", status));
        ctx.log.info(&body);

        let document = response_document(status, unwrap_envelope(parse_body(&body)));
        ctx.store_result(&document);
        if status.is_success() { 0 } else { 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::Fixture;
    use ferrule_core::domain::job::JobDefinition;
    use ferrule_core::shortcuts::apply_shortcut;

    fn base_product() -> Value {
        json!({
            "host": "https://pve.local:8006/",
            "node": "pve1",
            "vmid": 105,
            "token_id": "root@pam!ci",
            "token_secret": "abc-123",
        })
    }

    fn call_for(kind: &str, extra: Value) -> Result<ProxmoxCall, String> {
        let mut product = base_product();
        if let (Value::Object(p), Value::Object(e)) = (&mut product, extra) {
            p.extend(e);
        }
        let mut job = JobDefinition {
            executor: "proxmox".into(),
            kind: kind.into(),
            product: match product {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            ..Default::default()
        };
        apply_shortcut(&mut job);

        let fx = Fixture::new(Value::Object(job.product));
        ProxmoxCall::from_context(&fx.ctx())
    }

    #[test]
    fn test_routes() {
        let cases = [
            ("lxc_start", Method::POST, "https://pve.local:8006/api2/json/nodes/pve1/lxc/105/status/start"),
            ("kvm_status", Method::GET, "https://pve.local:8006/api2/json/nodes/pve1/qemu/105/status/current"),
            ("kvm_config", Method::GET, "https://pve.local:8006/api2/json/nodes/pve1/qemu/105/config"),
            ("lxc_metrics", Method::GET, "https://pve.local:8006/api2/json/nodes/pve1/lxc/105/rrddata"),
            ("lxc_delete", Method::DELETE, "https://pve.local:8006/api2/json/nodes/pve1/lxc/105"),
            ("kvm_create", Method::POST, "https://pve.local:8006/api2/json/nodes/pve1/qemu"),
            ("kvm_list", Method::GET, "https://pve.local:8006/api2/json/nodes/pve1/qemu"),
        ];
        for (kind, method, url) in cases {
            let call = call_for(kind, json!({})).unwrap();
            assert_eq!(call.route(), (method, url.to_string()), "{}", kind);
        }
    }

    #[test]
    fn test_params_resolved_and_moved() {
        let mut product = base_product();
        product["params"] = json!({"hostname": "${A.name}", "memory": 512});
        let mut job = JobDefinition {
            executor: "proxmox".into(),
            kind: "lxc_create".into(),
            product: match product {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            ..Default::default()
        };
        apply_shortcut(&mut job);

        let mut fx = Fixture::new(Value::Object(job.product));
        fx.results.insert("A", json!({"name": "web01"}));
        let call = ProxmoxCall::from_context(&fx.ctx()).unwrap();

        assert_eq!(call.params["hostname"], "web01");
        assert_eq!(call.params["memory"], 512);

        let request = call.request(&Client::new()).unwrap().build().unwrap();
        assert_eq!(request.headers()["Authorization"], "PVEAPIToken=root@pam!ci=abc-123");
        let body: Value = serde_json::from_slice(request.body().unwrap().as_bytes().unwrap()).unwrap();
        assert_eq!(body, json!({"hostname": "web01", "memory": 512}));
    }

    #[test]
    fn test_get_params_become_query() {
        let call = call_for("kvm_metrics", json!({"api_params": {"timeframe": "hour"}})).unwrap();
        let request = call.request(&Client::new()).unwrap().build().unwrap();
        assert_eq!(request.url().query(), Some("timeframe=hour"));
        assert!(request.body().is_none());
    }

    #[test]
    fn test_missing_parameters_are_reported() {
        let fx = Fixture::new(json!({"host": "https://pve", "type": "lxc"}));
        let err = ProxmoxCall::from_context(&fx.ctx()).unwrap_err();
        assert!(err.contains("node"));
        assert!(err.contains("token_id"));
        assert!(err.contains("api_command"));
    }

    #[test]
    fn test_unwrap_envelope() {
        assert_eq!(unwrap_envelope(json!({"data": [1, 2]})), json!([1, 2]));
        assert_eq!(unwrap_envelope(json!({"data": 1, "x": 2})), json!({"data": 1, "x": 2}));
        assert_eq!(unwrap_envelope(json!("text")), json!("text"));
    }

    #[tokio::test]
    async fn test_truncated_body_is_logged() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 100\r\n\r\n{\"da")
                .await
                .unwrap();
        });

        let mut product = base_product();
        product["host"] = json!(format!("http://{}", addr));
        product["type"] = json!("lxc");
        product["api_command"] = json!("status/current");
        let fx = Fixture::new(product);

        let code = ProxmoxExecutor::new(Client::new()).execute(&fx.ctx()).await;
        server.await.unwrap();

        assert_eq!(code, 0);
        assert!(fx.log.contains("Failed to read response body"));
        let stored = fx.store.read("JobJobJob1").unwrap().unwrap();
        assert_eq!(stored["success"], true);
    }
}
