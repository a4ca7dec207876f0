//! Upstream byte sources.
//!
//! Uploads live in external storage; the pipeline only needs "fetch bytes by
//! reference". URLs go over HTTP, anything else is a path under a configured
//! data directory.

use crate::error::{Result, SheetError};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fetched upload, owned by the request that fetched it.
#[derive(Debug, Clone)]
pub struct RawUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl RawUpload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

#[async_trait]
pub trait ByteSource: Send + Sync {
    async fn fetch(&self, reference: &str) -> Result<RawUpload>;
}

pub struct HttpByteSource {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpByteSource {
    pub fn new(max_bytes: usize, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SheetError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, max_bytes })
    }
}

#[async_trait]
impl ByteSource for HttpByteSource {
    async fn fetch(&self, reference: &str) -> Result<RawUpload> {
        info!("Fetching upload from {}", reference);
        let mut response = self
            .client
            .get(reference)
            .send()
            .await
            .map_err(|e| SheetError::Fetch(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SheetError::FileNotFound(reference.to_string()));
        }
        if !status.is_success() {
            return Err(SheetError::Fetch(status.to_string()));
        }

        if let Some(len) = response.content_length() {
            check_size(len as usize, self.max_bytes)?;
        }

        // Chunked bodies carry no length up front; the cap applies as they arrive.
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| SheetError::Fetch(e.to_string()))?
        {
            check_size(bytes.len() + chunk.len(), self.max_bytes)?;
            bytes.extend_from_slice(&chunk);
        }
        debug!("Fetched {} bytes", bytes.len());

        Ok(RawUpload::new(filename_from_reference(reference), bytes))
    }
}

fn check_size(size: usize, max_bytes: usize) -> Result<()> {
    if size > max_bytes {
        return Err(SheetError::Fetch(format!(
            "file of {} bytes exceeds the {} byte limit",
            size, max_bytes
        )));
    }
    Ok(())
}

/// Reads files beneath `root`. References may not climb out of it.
pub struct LocalFileSource {
    root: PathBuf,
}

impl LocalFileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, reference: &str) -> Result<PathBuf> {
        let relative = Path::new(reference);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            warn!("Refusing reference '{}' outside the data directory", reference);
            return Err(SheetError::FileNotFound(reference.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ByteSource for LocalFileSource {
    async fn fetch(&self, reference: &str) -> Result<RawUpload> {
        let path = self.resolve(reference)?;
        debug!("Reading upload from {}", path.display());
        let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SheetError::FileNotFound(reference.to_string()),
            _ => SheetError::Fetch(format!("{}: {}", reference, e)),
        })?;
        Ok(RawUpload::new(filename_from_reference(reference), bytes))
    }
}

/// Routes URLs to HTTP and plain references to the local directory.
pub struct ReferenceSource {
    http: HttpByteSource,
    local: Option<LocalFileSource>,
}

impl ReferenceSource {
    pub fn new(max_bytes: usize, timeout: Duration, data_dir: Option<PathBuf>) -> Result<Self> {
        Ok(Self {
            http: HttpByteSource::new(max_bytes, timeout)?,
            local: data_dir.map(LocalFileSource::new),
        })
    }
}

#[async_trait]
impl ByteSource for ReferenceSource {
    async fn fetch(&self, reference: &str) -> Result<RawUpload> {
        let lower = reference.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return self.http.fetch(reference).await;
        }
        match &self.local {
            Some(local) => local.fetch(reference).await,
            None => {
                warn!("No data directory configured for reference '{}'", reference);
                Err(SheetError::FileNotFound(reference.to_string()))
            }
        }
    }
}

fn filename_from_reference(reference: &str) -> String {
    let path = reference.split(|c: char| c == '?' || c == '#').next().unwrap_or(reference);
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("upload.csv")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_reference("https://cdn.example.com/raw/upload/v1/sales.csv?x=1"),
            "sales.csv"
        );
        assert_eq!(filename_from_reference("data/people.csv"), "people.csv");
    }

    #[tokio::test]
    async fn test_local_source_reads_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("people.csv"), "name\nAlice\n").unwrap();

        let source = LocalFileSource::new(dir.path());
        let upload = source.fetch("people.csv").await.unwrap();
        assert_eq!(upload.filename, "people.csv");
        assert_eq!(upload.bytes, b"name\nAlice\n");
    }

    #[tokio::test]
    async fn test_local_source_rejects_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalFileSource::new(dir.path());

        assert!(matches!(source.fetch("../etc/passwd").await, Err(SheetError::FileNotFound(_))));
        assert!(matches!(source.fetch("/etc/passwd").await, Err(SheetError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_missing_local_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let source = ReferenceSource::new(1024, Duration::from_secs(5), Some(dir.path().to_path_buf())).unwrap();
        let err = source.fetch("nope.csv").await.unwrap_err();
        assert!(matches!(err, SheetError::FileNotFound(_)));
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_plain_reference_without_data_dir_is_rejected() {
        let source = ReferenceSource::new(1024, Duration::from_secs(5), None).unwrap();
        assert!(matches!(source.fetch("people.csv").await, Err(SheetError::FileNotFound(_))));
    }

    /// Serves one canned response on a local port and returns its URL.
    async fn serve_once(response: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(&response).await;
            let _ = stream.shutdown().await;
        });
        format!("http://{}/data/people.csv", addr)
    }

    #[tokio::test]
    async fn test_chunked_body_over_limit_is_refused() {
        let mut response = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
        for _ in 0..8 {
            response.extend_from_slice(b"10\r\n0123456789abcdef\r\n");
        }
        response.extend_from_slice(b"0\r\n\r\n");
        let url = serve_once(response).await;

        let source = HttpByteSource::new(64, Duration::from_secs(5)).unwrap();
        let err = source.fetch(&url).await.unwrap_err();
        assert!(err.to_string().contains("exceeds the 64 byte limit"), "{}", err);
        assert_eq!(err.status_code(), 502);
    }

    #[tokio::test]
    async fn test_chunked_body_within_limit_is_read() {
        let response =
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nname\n\r\n6\r\nAlice\n\r\n0\r\n\r\n".to_vec();
        let url = serve_once(response).await;

        let source = HttpByteSource::new(64, Duration::from_secs(5)).unwrap();
        let upload = source.fetch(&url).await.unwrap();
        assert_eq!(upload.filename, "people.csv");
        assert_eq!(upload.bytes, b"name\nAlice\n");
    }

    #[tokio::test]
    async fn test_upstream_not_found_and_server_errors() {
        let url = serve_once(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n".to_vec()).await;
        let source = HttpByteSource::new(64, Duration::from_secs(5)).unwrap();
        assert!(matches!(source.fetch(&url).await, Err(SheetError::FileNotFound(_))));

        let url = serve_once(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\n\r\n".to_vec()).await;
        let err = source.fetch(&url).await.unwrap_err();
        assert!(matches!(err, SheetError::Fetch(_)));
        assert_eq!(err.status_code(), 502);
    }

    #[tokio::test]
    async fn test_stalled_upstream_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let source = HttpByteSource::new(64, Duration::from_millis(200)).unwrap();
        let err = source
            .fetch(&format!("http://{}/slow.csv", addr))
            .await
            .unwrap_err();
        assert!(matches!(err, SheetError::Fetch(_)));
    }
}
