// Newline-delimited JSON-RPC over stdin/stdout. Logging stays on stderr;
// stdout carries protocol frames only.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};

use crate::engine::dispatch::{HttpTransport, UpstreamTransport};
use crate::engine::token_cache::{GoogleExchanger, TokenExchanger};
use crate::engine::Engine;
use crate::error::AppResult;
use crate::modules::store::CredentialStore;

use super::protocol::{ErrorCode, JsonRpcRequest, JsonRpcResponse};
use super::tools::{self, ToolCallError};

const PROTOCOL_VERSION: &str = "2025-06-18";
const SERVER_NAME: &str = "gemini-bridge";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct McpServer<T = HttpTransport, E = GoogleExchanger> {
    engine: Engine<T, E>,
}

impl McpServer {
    pub fn new(store: CredentialStore) -> Self {
        Self {
            engine: Engine::new(store),
        }
    }
}

impl<T: UpstreamTransport, E: TokenExchanger> McpServer<T, E> {
    pub fn with_engine(engine: Engine<T, E>) -> Self {
        Self { engine }
    }

    fn handle_initialize(&self) -> Value {
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {"list": true, "call": true}},
            "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION},
        })
    }

    async fn handle_tools_call(&self, id: Value, params: &Value) -> JsonRpcResponse {
        let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
        if name.is_empty() {
            return JsonRpcResponse::failure(
                id,
                ErrorCode::InvalidParams,
                "Missing tool name".to_string(),
            );
        }
        let args = params
            .get("arguments")
            .cloned()
            .unwrap_or(Value::Object(Default::default()));

        match tools::call_tool(&self.engine, name, &args).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(ToolCallError::InvalidParams(message)) => {
                JsonRpcResponse::failure(id, ErrorCode::InvalidParams, message)
            }
            Err(ToolCallError::App(err)) => {
                tracing::warn!("tool {} failed: {}", name, err);
                JsonRpcResponse::success(id, tools::error_result(&err))
            }
        }
    }

    /// Processes one incoming line. `None` means nothing goes back on the
    /// wire (notifications).
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
            Ok(request) => request,
            Err(_) => {
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    ErrorCode::ParseError,
                    "Parse error".to_string(),
                ));
            }
        };

        match request.method.as_str() {
            _ if request.method.starts_with("notifications/") => None,
            "initialize" => request
                .id
                .map(|id| JsonRpcResponse::success(id, self.handle_initialize())),
            "tools/list" => request
                .id
                .map(|id| JsonRpcResponse::success(id, tools::list_tools())),
            "tools/call" => match request.id {
                Some(id) => Some(self.handle_tools_call(id, &request.params).await),
                None => None,
            },
            _ => request.id.map(|id| {
                JsonRpcResponse::failure(
                    id,
                    ErrorCode::MethodNotFound,
                    "Method not found".to_string(),
                )
            }),
        }
    }

    pub async fn run_stdio(&self) -> AppResult<()> {
        let stdin = tokio::io::stdin();
        let stdout = tokio::io::stdout();
        let mut reader = BufReader::new(stdin).lines();
        let mut writer = BufWriter::new(stdout);

        tracing::info!("{} {} listening on stdio", SERVER_NAME, SERVER_VERSION);
        while let Some(line) = reader.next_line().await? {
            if let Some(response) = self.handle_line(&line).await {
                let payload = serde_json::to_string(&response).unwrap_or_default();
                writer.write_all(payload.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }
        tracing::info!("stdin closed, shutting down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::dispatch::{Dispatcher, UpstreamReply};
    use crate::engine::token_cache::TokenCache;
    use crate::models::{AccountRecord, AccountStore, TokenResponse};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FakeExchanger;

    #[async_trait]
    impl TokenExchanger for FakeExchanger {
        async fn exchange(&self, _refresh_token: &str) -> AppResult<TokenResponse> {
            Ok(TokenResponse {
                access_token: "ya29.fake".into(),
                expires_in: 3600,
                token_type: "Bearer".into(),
                refresh_token: None,
            })
        }
    }

    struct FakeTransport;

    #[async_trait]
    impl UpstreamTransport for FakeTransport {
        async fn post(
            &self,
            url: &str,
            _access_token: &str,
            _body: &Value,
            sse: bool,
        ) -> AppResult<UpstreamReply> {
            let body = if url.contains("fetchAvailableModels") {
                r#"{"models":{"gemini-3-flash":{"quotaInfo":{"remainingFraction":0.8}}}}"#.into()
            } else if sse {
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"pong\"}]},\"finishReason\":\"STOP\"}]}\n\n"
                    .to_string()
            } else {
                r#"{"candidates":[{"content":{"parts":[{"text":"pong"}]},"finishReason":"STOP"}]}"#
                    .into()
            };
            Ok(UpstreamReply { status: 200, body })
        }
    }

    fn server_with_accounts(dir: &TempDir, accounts: Vec<AccountRecord>) -> McpServer<FakeTransport, FakeExchanger> {
        let store = CredentialStore::with_paths(
            dir.path().join("accounts.json"),
            dir.path().join("legacy.json"),
        );
        store
            .save(&AccountStore {
                accounts,
                settings: Default::default(),
            })
            .unwrap();
        McpServer::with_engine(Engine::with_parts(
            store,
            TokenCache::new(),
            FakeExchanger,
            Dispatcher::new(FakeTransport),
        ))
    }

    fn one_account(dir: &TempDir) -> McpServer<FakeTransport, FakeExchanger> {
        server_with_accounts(dir, vec![AccountRecord::new("a@x.com".into(), "rt".into())])
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let dir = TempDir::new().unwrap();
        let server = one_account(&dir);
        let response = server
            .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
    }

    #[tokio::test]
    async fn notifications_get_no_reply() {
        let dir = TempDir::new().unwrap();
        let server = one_account(&dir);
        let response = server
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized","params":{}}"#)
            .await;
        assert!(response.is_none());
        assert!(server.handle_line("").await.is_none());
    }

    #[tokio::test]
    async fn malformed_line_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let server = one_account(&dir);
        let response = server.handle_line("{not json").await.unwrap();
        assert_eq!(response.error.unwrap().code, ErrorCode::ParseError.as_i32());
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let dir = TempDir::new().unwrap();
        let server = one_account(&dir);
        let response = server
            .handle_line(r#"{"jsonrpc":"2.0","id":7,"method":"resources/list","params":{}}"#)
            .await
            .unwrap();
        assert_eq!(
            response.error.unwrap().code,
            ErrorCode::MethodNotFound.as_i32()
        );
    }

    #[tokio::test]
    async fn tools_list_and_generate_round_trip() {
        let dir = TempDir::new().unwrap();
        let server = one_account(&dir);

        let listed = server
            .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list","params":{}}"#)
            .await
            .unwrap();
        assert_eq!(listed.result.unwrap()["tools"].as_array().unwrap().len(), 5);

        let called = server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"generate","arguments":{"prompt":"ping","thinking":false,"model":"gemini-2.5-flash"}}}"#,
            )
            .await
            .unwrap();
        let result = called.result.unwrap();
        assert_eq!(result["isError"], false);
        assert_eq!(result["content"][0]["text"], "pong");
    }

    #[tokio::test]
    async fn engine_failure_renders_as_tool_error_result() {
        let dir = TempDir::new().unwrap();
        let server = server_with_accounts(&dir, Vec::new());
        let called = server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"generate","arguments":{"prompt":"ping"}}}"#,
            )
            .await
            .unwrap();
        let result = called.result.unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("No accounts"));
    }

    #[tokio::test]
    async fn bad_arguments_are_protocol_invalid_params() {
        let dir = TempDir::new().unwrap();
        let server = one_account(&dir);
        let called = server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"generate","arguments":{}}}"#,
            )
            .await
            .unwrap();
        assert_eq!(
            called.error.unwrap().code,
            ErrorCode::InvalidParams.as_i32()
        );

        let missing_name = server
            .handle_line(r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{}}"#)
            .await
            .unwrap();
        assert_eq!(
            missing_name.error.unwrap().code,
            ErrorCode::InvalidParams.as_i32()
        );
    }

    #[tokio::test]
    async fn quota_and_models_tools_read_the_catalog() {
        let dir = TempDir::new().unwrap();
        let server = one_account(&dir);

        let models = server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":6,"method":"tools/call","params":{"name":"list_models","arguments":{}}}"#,
            )
            .await
            .unwrap();
        let text = models.result.unwrap()["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(text.contains("gemini-3-flash"));

        let quota = server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"get_quota","arguments":{}}}"#,
            )
            .await
            .unwrap();
        let text = quota.result.unwrap()["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(text.contains("0.8"));
    }
}
