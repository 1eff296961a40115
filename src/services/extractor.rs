use crate::error::{AnalysisError, ParseError, RetrievalError};
use crate::infrastructure::manifest::ManifestParser;
use crate::models::{FileLocation, ParsedPackage, RetrievedFile};
use crate::utils::validation::{has_zip_signature, sanitize_file_name};
use futures::TryStreamExt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

pub const UNKNOWN_APP: &str = "Unknown App";

const WORKSPACE_PREFIX: &str = "apk-analyzer-";

/// Materializes a retrieved archive in a private workspace and reads its manifest
pub struct ArchiveExtractor {
    http: reqwest::Client,
    parser: Arc<dyn ManifestParser>,
    download_timeout: Duration,
    workspace_root: Option<PathBuf>,
}

impl ArchiveExtractor {
    pub fn new(parser: Arc<dyn ManifestParser>, download_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            parser,
            download_timeout,
            workspace_root: None,
        }
    }

    /// Creates workspaces under `root` instead of the system temp dir
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    fn create_workspace(&self) -> io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        match &self.workspace_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }

    /// The workspace is gone by the time this returns, whatever the outcome.
    pub async fn extract(&self, file: &RetrievedFile) -> Result<ParsedPackage, AnalysisError> {
        let workspace = self.create_workspace()?;
        debug!("📂 Workspace created: {:?}", workspace.path());

        let result = self.extract_in(workspace.path(), file).await;

        // Drop would remove it too; closing explicitly surfaces the failure
        let path = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            warn!("⚠️  Failed to remove workspace {:?}: {}", path, e);
        } else {
            debug!("🧹 Workspace removed: {:?}", path);
        }

        result
    }

    async fn extract_in(
        &self,
        workspace: &Path,
        file: &RetrievedFile,
    ) -> Result<ParsedPackage, AnalysisError> {
        let archive_path = workspace.join(sanitize_file_name(&file.file_name));

        match &file.location {
            FileLocation::Buffer(bytes) => {
                tokio::fs::write(&archive_path, bytes).await?;
            }
            FileLocation::Url(url) => {
                let secs = self.download_timeout.as_secs();
                let written = tokio::time::timeout(
                    self.download_timeout,
                    self.download(url, &archive_path),
                )
                .await
                .map_err(|_| RetrievalError::Timeout(secs))??;
                debug!("📥 Downloaded {} bytes to workspace", written);
            }
        }

        let parser = Arc::clone(&self.parser);
        let path = archive_path.clone();
        let manifest = tokio::task::spawn_blocking(move || {
            ensure_zip(&path)?;
            parser.parse(&path)
        })
        .await
        .map_err(|e| AnalysisError::Aborted(e.to_string()))??;

        let package_name = manifest
            .package
            .filter(|p| !p.trim().is_empty())
            .ok_or(ParseError::MissingPackage)?;
        let app_name = manifest
            .label
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_APP.to_string());

        info!("📦 Parsed {} ({})", package_name, app_name);
        Ok(ParsedPackage {
            package_name,
            app_name,
        })
    }

    /// Streams the response body to `dest` chunk by chunk
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, AnalysisError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| RetrievalError::Download(e.without_url()))?;

        let body = response.bytes_stream().map_err(io::Error::other);
        let mut reader = std::pin::pin!(StreamReader::new(body));
        let mut out = tokio::fs::File::create(dest).await?;

        let written = tokio::io::copy(&mut reader, &mut out)
            .await
            .map_err(copy_error)?;
        out.flush().await?;

        Ok(written)
    }
}

/// Body stream failures are download errors; everything else is local I/O
fn copy_error(e: io::Error) -> AnalysisError {
    let from_body = e
        .get_ref()
        .is_some_and(|inner| inner.is::<reqwest::Error>());
    if !from_body {
        return AnalysisError::Workspace(e);
    }

    match e.into_inner().map(|inner| inner.downcast::<reqwest::Error>()) {
        Some(Ok(source)) => RetrievalError::Download((*source).without_url()).into(),
        _ => AnalysisError::Workspace(io::Error::other("response body stream failed")),
    }
}

fn ensure_zip(path: &Path) -> Result<(), ParseError> {
    let mut header = [0u8; 4];
    let mut file = std::fs::File::open(path).map_err(|e| ParseError::Archive(e.to_string()))?;
    let read = file
        .read(&mut header)
        .map_err(|e| ParseError::Archive(e.to_string()))?;

    if !has_zip_signature(&header[..read]) {
        return Err(ParseError::Archive("not a ZIP container".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::manifest::ApkManifestParser;
    use crate::infrastructure::manifest::fixtures::{Value, apk_bytes, binary_manifest};
    use bytes::Bytes;

    fn extractor(root: &Path) -> ArchiveExtractor {
        ArchiveExtractor::new(Arc::new(ApkManifestParser), Duration::from_secs(5))
            .with_workspace_root(root)
    }

    fn buffered(name: &str, bytes: Vec<u8>) -> RetrievedFile {
        RetrievedFile {
            file_name: name.to_string(),
            file_size: bytes.len() as u64,
            mime_type: String::new(),
            location: FileLocation::Buffer(Bytes::from(bytes)),
        }
    }

    fn assert_root_empty(root: &Path) {
        let leftovers: Vec<_> = std::fs::read_dir(root).unwrap().collect();
        assert!(leftovers.is_empty(), "workspace left behind: {:?}", leftovers);
    }

    #[tokio::test]
    async fn test_extract_buffer_and_cleanup() {
        let root = tempfile::tempdir().unwrap();
        let manifest = binary_manifest(Some("com.example.app"), Some(Value::Str("Example")), true);
        let file = buffered("../../evil name.apk", apk_bytes(&manifest));

        let parsed = extractor(root.path()).extract(&file).await.unwrap();

        assert_eq!(parsed.package_name, "com.example.app");
        assert_eq!(parsed.app_name, "Example");
        assert_root_empty(root.path());
    }

    #[tokio::test]
    async fn test_resource_label_defaults_to_unknown() {
        let root = tempfile::tempdir().unwrap();
        let manifest = binary_manifest(Some("org.example"), Some(Value::Ref(0x7f0e0001)), false);

        let parsed = extractor(root.path())
            .extract(&buffered("app.apk", apk_bytes(&manifest)))
            .await
            .unwrap();

        assert_eq!(parsed.app_name, UNKNOWN_APP);
    }

    #[tokio::test]
    async fn test_missing_package_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let manifest = binary_manifest(None, Some(Value::Str("NoPkg")), true);

        let err = extractor(root.path())
            .extract(&buffered("app.apk", apk_bytes(&manifest)))
            .await
            .unwrap_err();

        assert!(err.is_missing_package());
        assert_root_empty(root.path());
    }

    #[tokio::test]
    async fn test_not_a_zip_cleans_up() {
        let root = tempfile::tempdir().unwrap();

        let err = extractor(root.path())
            .extract(&buffered("app.apk", b"definitely not an archive".to_vec()))
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Parse(ParseError::Archive(_))));
        assert_root_empty(root.path());
    }

    #[tokio::test]
    async fn test_extract_from_url() {
        let root = tempfile::tempdir().unwrap();
        let manifest = binary_manifest(Some("com.example.app"), None, true);

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/file/bot1:t/documents/app.apk")
            .with_body(apk_bytes(&manifest))
            .create_async()
            .await;

        let file = RetrievedFile {
            file_name: "app.apk".to_string(),
            file_size: 0,
            mime_type: String::new(),
            location: FileLocation::Url(format!("{}/file/bot1:t/documents/app.apk", server.url())),
        };

        let parsed = extractor(root.path()).extract(&file).await.unwrap();
        assert_eq!(parsed.package_name, "com.example.app");
        assert_eq!(parsed.app_name, UNKNOWN_APP);
        assert_root_empty(root.path());
    }

    #[tokio::test]
    async fn test_download_http_error_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/file/bot123456:SECRET-TOKEN/documents/expired.apk")
            .with_status(404)
            .create_async()
            .await;

        let file = RetrievedFile {
            file_name: "app.apk".to_string(),
            file_size: 0,
            mime_type: String::new(),
            location: FileLocation::Url(format!(
                "{}/file/bot123456:SECRET-TOKEN/documents/expired.apk",
                server.url()
            )),
        };

        let err = extractor(root.path()).extract(&file).await.unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Retrieval(RetrievalError::Download(_))
        ));
        // The direct-download URL embeds the bot token
        assert!(!err.to_string().contains("SECRET-TOKEN"), "{err}");
        assert_root_empty(root.path());
    }

    #[tokio::test]
    async fn test_stalled_download_times_out() {
        let root = tempfile::tempdir().unwrap();

        // Accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let file = RetrievedFile {
            file_name: "app.apk".to_string(),
            file_size: 0,
            mime_type: String::new(),
            location: FileLocation::Url(format!("http://{}/file/bot1:t/app.apk", addr)),
        };

        let extractor = ArchiveExtractor::new(Arc::new(ApkManifestParser), Duration::from_millis(200))
            .with_workspace_root(root.path());

        let started = std::time::Instant::now();
        let err = extractor.extract(&file).await.unwrap_err();
        assert!(
            matches!(err, AnalysisError::Retrieval(RetrievalError::Timeout(_))),
            "unexpected error: {err}"
        );
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_root_empty(root.path());
    }
}
