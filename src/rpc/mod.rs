//! Framed JSON-RPC transport.
//!
//! Messages travel over a duplex byte stream (the process's stdin/stdout
//! pair in production) as header-framed JSON: `Content-Length: N`, a blank
//! line, then N bytes of payload. Exactly one plaintext `READY` line is
//! written before the stream switches into framed mode, so a supervising
//! process can synchronize on startup. All diagnostics go to stderr via
//! `tracing`; nothing else may touch the framed stream.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::scheduler::Scheduler;
use crate::service::AgentService;

pub const READY_SENTINEL: &str = "READY";

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

/// Serve one connection until the peer closes its write side. Every request
/// body is executed on the scheduler's worker thread; this task only frames,
/// decodes and encodes.
pub async fn serve<R, W>(reader: R, mut writer: W, scheduler: Scheduler) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(format!("{READY_SENTINEL}\n").as_bytes())
        .await
        .context("writing readiness sentinel")?;
    writer.flush().await?;
    info!("transport ready");

    let mut reader = BufReader::new(reader);
    loop {
        let body = match read_frame(&mut reader).await? {
            Some(body) => body,
            None => {
                info!("peer closed the stream");
                return Ok(());
            }
        };

        let request: Request = match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "unparseable frame");
                let response = error_response(Value::Null, PARSE_ERROR, "Parse error");
                write_frame(&mut writer, &response).await?;
                continue;
            }
        };

        let method = request.method.clone();
        let params = request.params;
        let outcome = scheduler
            .call(move || AgentService::with(|service| service.dispatch(&method, params)))
            .await;

        let Some(id) = request.id else {
            // Notification: executed, never answered.
            debug!(method = %request.method, "notification handled");
            continue;
        };

        let response = match outcome {
            Ok(Some(result)) => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": result,
            }),
            Ok(None) => {
                warn!(method = %request.method, "unknown method");
                error_response(id, METHOD_NOT_FOUND, "Method not found")
            }
            Err(_) => error_response(id, INTERNAL_ERROR, "Agent is shutting down"),
        };
        write_frame(&mut writer, &response).await?;
    }
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

/// Read one header-framed message. `Ok(None)` is a clean end of stream at a
/// frame boundary.
async fn read_frame<R>(reader: &mut BufReader<R>) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            if content_length.is_some() {
                bail!("stream ended inside frame headers");
            }
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some(value) = trimmed
            .strip_prefix("Content-Length:")
            .or_else(|| trimmed.strip_prefix("content-length:"))
        {
            content_length = Some(
                value
                    .trim()
                    .parse::<usize>()
                    .context("invalid Content-Length header")?,
            );
        }
        // Other headers (e.g. Content-Type) are tolerated and ignored.
    }

    let length = content_length.context("frame missing Content-Length header")?;
    let mut body = vec![0u8; length];
    reader
        .read_exact(&mut body)
        .await
        .context("reading frame body")?;
    Ok(Some(body))
}

pub async fn write_frame<W>(writer: &mut W, message: &Value) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(message)?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}
