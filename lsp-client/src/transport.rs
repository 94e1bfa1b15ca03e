//! LSP framing over the child's pipes: `Content-Length: N\r\n\r\n<body>`.

use lsp_types::{JSONRPC_VERSION, JsonRpcNotification, JsonRpcRequest, RequestId};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};

use crate::{LspError, Result};

pub struct Transport {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: RequestId,
}

impl Transport {
    pub fn new(stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self {
            stdin,
            stdout: BufReader::new(stdout),
            next_id: 1,
        }
    }

    /// Send a request and return its id.
    pub async fn request(&mut self, method: &str, params: Option<Value>) -> Result<RequestId> {
        let id = self.next_id;
        self.next_id += 1;
        let message = JsonRpcRequest::new(id, method, params);
        self.write_frame(&serde_json::to_vec(&message).map_err(|e| {
            LspError::Protocol(format!("failed to encode {method}: {e}"))
        })?)
        .await?;
        Ok(id)
    }

    pub async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<()> {
        let message = JsonRpcNotification::new(method, params);
        self.write_frame(&serde_json::to_vec(&message).map_err(|e| {
            LspError::Protocol(format!("failed to encode {method}: {e}"))
        })?)
        .await
    }

    async fn write_frame(&mut self, body: &[u8]) -> Result<()> {
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        self.stdin.write_all(header.as_bytes()).await?;
        self.stdin.write_all(body).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Read one framed message of any kind.
    pub async fn read_message(&mut self) -> Result<Value> {
        let mut content_length: Option<usize> = None;
        loop {
            let mut line = String::new();
            let read = self.stdout.read_line(&mut line).await?;
            if read == 0 {
                return Err(LspError::Protocol("server closed the pipe".to_string()));
            }
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some(value) = line
                .strip_prefix("Content-Length:")
                .map(str::trim)
                .and_then(|v| v.parse::<usize>().ok())
            {
                content_length = Some(value);
            }
            // Other headers (Content-Type) are ignored.
        }

        let length =
            content_length.ok_or_else(|| LspError::Protocol("missing Content-Length".to_string()))?;
        let mut body = vec![0u8; length];
        self.stdout.read_exact(&mut body).await?;
        serde_json::from_slice(&body)
            .map_err(|e| LspError::Protocol(format!("malformed message body: {e}")))
    }

    /// Block until the response for `id` arrives. Notifications and server
    /// requests that interleave are discarded; the client never has more
    /// than one request in flight.
    pub async fn wait_response(&mut self, id: RequestId) -> Result<Value> {
        loop {
            let message = self.read_message().await?;
            let is_response =
                message.get("id").and_then(Value::as_i64) == Some(id) && message.get("method").is_none();
            if !is_response {
                if let Some(method) = message.get("method").and_then(Value::as_str) {
                    tracing::debug!(method, "skipping server-initiated message");
                } else {
                    tracing::debug!("skipping unmatched response");
                }
                continue;
            }

            if let Some(error) = message.get("error") {
                return Err(LspError::Server {
                    code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                    message: error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string(),
                });
            }
            let jsonrpc = message.get("jsonrpc").and_then(Value::as_str);
            if jsonrpc != Some(JSONRPC_VERSION) {
                tracing::debug!(?jsonrpc, "response with unexpected jsonrpc version");
            }
            return Ok(message.get("result").cloned().unwrap_or(Value::Null));
        }
    }
}
