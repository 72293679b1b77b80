use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Image file extensions collected from the engine output
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Longest stderr excerpt carried in an error message
const MAX_STDERR_LEN: usize = 2000;

/// Failure reported by a conversion engine.
///
/// Engines give no structured error codes, so callers only get to know
/// whether the engine could be reached at all.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConvertError {
    /// The engine is missing, disabled, or could not be started
    #[error("{0}")]
    Unavailable(String),

    /// The engine ran but the conversion failed
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ConvertRequest {
    /// Staged PDF to convert
    pub input: PathBuf,
    /// Scratch directory the engine may write into
    pub output_dir: PathBuf,
    pub max_pages: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct ConvertedDocument {
    pub markdown: String,
    /// Image name -> raw image bytes
    pub images: BTreeMap<String, Vec<u8>>,
    pub page_count: Option<usize>,
}

/// Trait for document-to-markdown engines
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Convert the PDF at `request.input`
    async fn convert(&self, request: &ConvertRequest) -> Result<ConvertedDocument, ConvertError>;

    /// Check if the engine is available
    async fn health_check(&self) -> bool;
}

/// Runs the `marker_single` command line tool as a child process.
pub struct MarkerCliConverter {
    command: String,
    device: String,
}

impl MarkerCliConverter {
    pub fn new(command: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            device: device.into(),
        }
    }

    fn build_command(&self, request: &ConvertRequest) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.arg(&request.input)
            .arg("--output_dir")
            .arg(&request.output_dir)
            .arg("--output_format")
            .arg("markdown");

        if let Some(max_pages) = request.max_pages.filter(|n| *n > 0) {
            cmd.arg("--page_range").arg(format!("0-{}", max_pages - 1));
        }

        cmd.env("TORCH_DEVICE", &self.device)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

#[async_trait]
impl DocumentConverter for MarkerCliConverter {
    async fn convert(&self, request: &ConvertRequest) -> Result<ConvertedDocument, ConvertError> {
        tokio::fs::create_dir_all(&request.output_dir)
            .await
            .map_err(|e| ConvertError::Failed(format!("cannot create output directory: {}", e)))?;

        let output = self
            .build_command(request)
            .output()
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                    ConvertError::Unavailable(format!("cannot run '{}': {}", self.command, e))
                }
                _ => ConvertError::Failed(format!("failed to start '{}': {}", self.command, e)),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let cut = stderr.len().saturating_sub(MAX_STDERR_LEN);
            let start = stderr
                .char_indices()
                .map(|(i, _)| i)
                .find(|i| *i >= cut)
                .unwrap_or(stderr.len());
            let excerpt = &stderr[start..];
            tracing::error!("{} failed ({}): {}", self.command, output.status, excerpt);
            return Err(ConvertError::Failed(format!(
                "{} exited with {}: {}",
                self.command, output.status, excerpt
            )));
        }

        read_marker_output(&request.output_dir).await
    }

    async fn health_check(&self) -> bool {
        Command::new(&self.command)
            .arg("--help")
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

/// Converter used when the engine is turned off by configuration
pub struct DisabledConverter;

#[async_trait]
impl DocumentConverter for DisabledConverter {
    async fn convert(&self, _request: &ConvertRequest) -> Result<ConvertedDocument, ConvertError> {
        Err(ConvertError::Unavailable(
            "document conversion is disabled on this server".to_string(),
        ))
    }

    async fn health_check(&self) -> bool {
        false
    }
}

/// Factory function to create the configured converter
pub fn create_converter(converter_type: &str, command: &str, device: &str) -> Box<dyn DocumentConverter> {
    match converter_type.to_lowercase().as_str() {
        "marker" => Box::new(MarkerCliConverter::new(command, device)),
        "disabled" | "none" => Box::new(DisabledConverter),
        _ => {
            tracing::warn!("Unknown converter type '{}', using marker", converter_type);
            Box::new(MarkerCliConverter::new(command, device))
        }
    }
}

#[derive(Default)]
struct OutputFiles {
    markdown: Option<PathBuf>,
    meta: Option<PathBuf>,
    images: Vec<PathBuf>,
}

/// Walk the engine's output directory (it nests results in a per-document folder)
async fn collect_output_files(root: &Path) -> io::Result<OutputFiles> {
    let mut files = OutputFiles::default();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
                continue;
            }

            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase())
                .unwrap_or_default();

            if extension == "md" {
                files.markdown.get_or_insert(path);
            } else if extension == "json" && file_name.ends_with("_meta.json") {
                files.meta.get_or_insert(path);
            } else if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
                files.images.push(path);
            }
        }
    }

    Ok(files)
}

async fn read_marker_output(output_dir: &Path) -> Result<ConvertedDocument, ConvertError> {
    let files = collect_output_files(output_dir)
        .await
        .map_err(|e| ConvertError::Failed(format!("cannot read converter output: {}", e)))?;

    let markdown_path = files
        .markdown
        .ok_or_else(|| ConvertError::Failed("converter produced no markdown output".to_string()))?;
    let markdown = tokio::fs::read_to_string(&markdown_path)
        .await
        .map_err(|e| ConvertError::Failed(format!("cannot read markdown output: {}", e)))?;

    let mut images = BTreeMap::new();
    for path in files.images {
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                images.insert(name, bytes);
            }
            Err(e) => tracing::warn!("Error reading image {}: {}", path.display(), e),
        }
    }

    let page_count = match files.meta {
        Some(meta) => read_page_count(&meta).await,
        None => None,
    };

    Ok(ConvertedDocument {
        markdown,
        images,
        page_count,
    })
}

async fn read_page_count(meta_path: &Path) -> Option<usize> {
    let raw = tokio::fs::read(meta_path).await.ok()?;
    let meta: serde_json::Value = match serde_json::from_slice(&raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Ignoring unreadable converter metadata {}: {}", meta_path.display(), e);
            return None;
        }
    };
    meta.get("page_stats")
        .and_then(|s| s.as_array())
        .map(|pages| pages.len())
}
