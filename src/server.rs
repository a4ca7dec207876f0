//! HTTP server for the SQL generation API.
//! Plain tokio sockets with minimal HTTP/1.1 handling.

use crate::api::{ErrorEnvelope, GenerateSqlRequest, SuccessEnvelope};
use crate::config::ServerConfig;
use crate::error::{Result, SheetError};
use crate::export;
use crate::ingestion::ByteSource;
use crate::pipeline::{Pipeline, PipelineOutput};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

const MAX_REQUEST_BYTES: usize = 1_000_000;
const READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn json(status: u16, body: &impl serde::Serialize) -> Self {
        let body = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
        Self {
            status,
            content_type: "application/json",
            headers: Vec::new(),
            body,
        }
    }

    pub fn csv(body: String) -> Self {
        Self {
            status: 200,
            content_type: export::CSV_CONTENT_TYPE,
            headers: vec![(
                "Content-Disposition".to_string(),
                format!("attachment; filename=\"{}\"", export::CSV_FILENAME),
            )],
            body,
        }
    }

    fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain",
            headers: Vec::new(),
            body: String::new(),
        }
    }

    fn to_http(&self, origin: &str) -> String {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\n\
             Content-Type: {}\r\n\
             Access-Control-Allow-Origin: {}\r\n\
             Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
             Access-Control-Allow-Headers: Content-Type, Authorization\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n",
            self.status,
            status_text(self.status),
            self.content_type,
            origin,
            self.body.len(),
        );
        for (name, value) in &self.headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        format!("{}\r\n{}", head, self.body)
    }
}

/// Parsed request line, headers and body.
#[derive(Debug)]
struct Request<'a> {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: &'a [u8],
}

fn parse_request(raw: &[u8]) -> Option<Request<'_>> {
    let header_end = find_header_end(raw)?;
    let head = String::from_utf8_lossy(&raw[..header_end]);
    let mut lines = head.lines();

    let mut parts = lines.next()?.split_whitespace();
    let method = parts.next()?.to_string();
    let full_path = parts.next()?;

    let path = full_path.split('?').next().unwrap_or(full_path);
    let mut path = path.trim_end_matches('/').to_string();
    if path.is_empty() {
        path = "/".to_string();
    }

    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .collect();

    Some(Request {
        method,
        path,
        headers,
        body: &raw[(header_end + 4).min(raw.len())..],
    })
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|w| w == b"\r\n\r\n")
}

fn content_length(raw: &[u8], header_end: usize) -> Option<usize> {
    let head = String::from_utf8_lossy(&raw[..header_end]);
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse().ok())
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

pub struct Server {
    config: ServerConfig,
    pipeline: Arc<Pipeline>,
    source: Arc<dyn ByteSource>,
}

impl Server {
    pub fn new(config: ServerConfig, pipeline: Arc<Pipeline>, source: Arc<dyn ByteSource>) -> Self {
        Self {
            config,
            pipeline,
            source,
        }
    }

    pub async fn serve(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("Server listening on http://{}", addr);

        let server = Arc::new(self);
        loop {
            let (stream, peer) = listener.accept().await?;
            debug!("New connection from {}", peer);
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.handle_connection(stream).await });
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 8192];

        let read_result = timeout(READ_TIMEOUT, async {
            loop {
                let n = stream.read(&mut chunk).await?;
                if n == 0 {
                    break;
                }
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    break;
                }
                if let Some(end) = find_header_end(&buffer) {
                    let wanted = content_length(&buffer, end).unwrap_or(0);
                    if buffer.len() >= end + 4 + wanted {
                        break;
                    }
                }
            }
            Ok::<(), std::io::Error>(())
        })
        .await;

        match read_result {
            Err(_) => {
                warn!("Request read timeout");
                return;
            }
            Ok(Err(e)) => {
                warn!("Failed to read from stream: {}", e);
                return;
            }
            Ok(Ok(())) => {}
        }
        if buffer.is_empty() {
            return;
        }

        let response = if buffer.len() > MAX_REQUEST_BYTES {
            (
                HttpResponse::json(413, &ErrorEnvelope::new("Request too large", "ValidationError")),
                "*".to_string(),
            )
        } else {
            let origin = parse_request(&buffer)
                .and_then(|r| r.headers.get("origin").cloned())
                .unwrap_or_default();
            (self.handle_request(&buffer).await, self.allow_origin(&origin))
        };

        let (response, origin) = response;
        if let Err(e) = stream.write_all(response.to_http(&origin).as_bytes()).await {
            warn!("Failed to write response: {}", e);
        }
    }

    /// CORS origin to echo. An empty allow-list admits any origin.
    fn allow_origin(&self, origin: &str) -> String {
        if self.config.allowed_origins.is_empty() {
            "*".to_string()
        } else if self.config.allowed_origins.iter().any(|o| o == origin) {
            origin.to_string()
        } else {
            "null".to_string()
        }
    }

    pub async fn handle_request(&self, raw: &[u8]) -> HttpResponse {
        let request = match parse_request(raw) {
            Some(r) => r,
            None => return HttpResponse::json(400, &ErrorEnvelope::new("Bad Request", "ValidationError")),
        };
        info!("{} {}", request.method, request.path);

        match (request.method.as_str(), request.path.as_str()) {
            ("OPTIONS", _) => HttpResponse::empty(204),
            ("GET", "/") => HttpResponse::json(
                200,
                &serde_json::json!({"message": "Server running successfully"}),
            ),
            ("GET", "/api/health") => HttpResponse::json(
                200,
                &serde_json::json!({"status": "ok", "service": "sheetsql"}),
            ),
            ("POST", "/generate_sql") => match self.generate(request.body).await {
                Ok(output) => HttpResponse::json(200, &SuccessEnvelope::from_output(&output)),
                Err(response) => response,
            },
            ("POST", "/generate_sql/csv") => match self.generate(request.body).await {
                Ok(output) => match export::to_csv(&output.result) {
                    Ok(csv) => HttpResponse::csv(csv),
                    Err(e) => self.error_response(&e),
                },
                Err(response) => response,
            },
            _ => HttpResponse::json(404, &ErrorEnvelope::new("Not Found", "NotFound")),
        }
    }

    async fn generate(&self, body: &[u8]) -> std::result::Result<PipelineOutput, HttpResponse> {
        let missing = || {
            HttpResponse::json(
                400,
                &ErrorEnvelope::new("Missing required parameters.", "ValidationError"),
            )
        };
        let request: GenerateSqlRequest = serde_json::from_slice(body).map_err(|_| missing())?;
        let (text, file_path) = request.required().ok_or_else(missing)?;

        self.pipeline
            .run_from_reference(self.source.as_ref(), text, file_path)
            .await
            .map_err(|e| self.error_response(&e))
    }

    fn error_response(&self, err: &SheetError) -> HttpResponse {
        HttpResponse::json(
            err.status_code(),
            &ErrorEnvelope::from_error(err, self.config.expose_stack),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_splits_head_and_body() {
        let raw = b"POST /generate_sql/?x=1 HTTP/1.1\r\nContent-Type: application/json\r\nOrigin: http://localhost:3000\r\n\r\n{\"a\":1}";
        let req = parse_request(raw).unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/generate_sql");
        assert_eq!(req.headers["origin"], "http://localhost:3000");
        assert_eq!(req.body, b"{\"a\":1}");
    }

    #[test]
    fn test_content_length_lookup() {
        let raw = b"POST / HTTP/1.1\r\ncontent-length: 12\r\n\r\n";
        let end = find_header_end(raw).unwrap();
        assert_eq!(content_length(raw, end), Some(12));
    }

    #[test]
    fn test_csv_response_headers() {
        let wire = HttpResponse::csv("a\n1".to_string()).to_http("*");
        assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(wire.contains("Content-Type: text/csv\r\n"));
        assert!(wire.contains("Content-Disposition: attachment; filename=\"query_results.csv\"\r\n"));
        assert!(wire.ends_with("\r\n\r\na\n1"));
    }
}
