use crate::models::{ConversionMetadata, ConvertResponse};
use crate::services::converter::{ConvertError, ConvertRequest, ConvertedDocument, DocumentConverter};
use crate::services::temp_store::{StagedFile, TempFileStore};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Fallback mime type when the image bytes are not recognised
const DEFAULT_IMAGE_MIME: &str = "image/png";

/// Drives one staged upload through the converter and shapes the response.
pub struct ConversionService {
    store: Arc<TempFileStore>,
    converter: Arc<dyn DocumentConverter>,
    torch_device: String,
}

impl ConversionService {
    pub fn new(
        store: Arc<TempFileStore>,
        converter: Arc<dyn DocumentConverter>,
        torch_device: String,
    ) -> Self {
        Self {
            store,
            converter,
            torch_device,
        }
    }

    pub fn store(&self) -> &Arc<TempFileStore> {
        &self.store
    }

    /// Convert `staged` and build the client response.
    ///
    /// The staged file and the converter's scratch directory are removed
    /// before this returns, whatever the outcome.
    pub async fn convert_staged(
        &self,
        staged: StagedFile,
        max_pages: Option<u32>,
    ) -> Result<ConvertResponse, ConvertError> {
        let scratch = self.store.scratch_dir(&staged);
        let request = ConvertRequest {
            input: staged.path.clone(),
            output_dir: scratch.clone(),
            max_pages,
        };

        tracing::info!(
            filename = %staged.original_name,
            size = staged.size,
            max_pages = ?max_pages,
            "Converting PDF: {}",
            staged.path.display()
        );
        let start = Instant::now();

        let outcome = match self.converter.convert(&request).await {
            Ok(document) => {
                let page_count = match document.page_count {
                    Some(n) => n,
                    None => count_pdf_pages(&staged.path).await.unwrap_or(0),
                };
                Ok(self.build_response(&staged, document, page_count))
            }
            Err(e) => Err(e),
        };

        self.store.remove(&staged.path).await;
        self.store.remove(&scratch).await;

        let elapsed_ms = start.elapsed().as_millis();
        match &outcome {
            Ok(response) => tracing::info!(
                filename = %staged.original_name,
                elapsed_ms,
                pages = response.metadata.page_count,
                "Conversion completed: {} characters, {} images",
                response.markdown.len(),
                response.images.len()
            ),
            Err(e) => tracing::error!(
                filename = %staged.original_name,
                elapsed_ms,
                "Conversion failed: {}",
                e
            ),
        }

        outcome
    }

    fn build_response(
        &self,
        staged: &StagedFile,
        document: ConvertedDocument,
        page_count: usize,
    ) -> ConvertResponse {
        let images = encode_images(document.images);

        ConvertResponse {
            markdown: document.markdown,
            images,
            metadata: ConversionMetadata {
                filename: staged.original_name.clone(),
                file_size: staged.size,
                page_count,
                torch_device: self.torch_device.clone(),
                timestamp: Utc::now(),
            },
            success: true,
            message: "PDF converted successfully".to_string(),
        }
    }
}

/// Turn raw image bytes into `data:` URIs, skipping empty payloads
pub fn encode_images(images: BTreeMap<String, Vec<u8>>) -> BTreeMap<String, String> {
    images
        .into_iter()
        .filter_map(|(name, bytes)| match encode_data_uri(&bytes) {
            Some(uri) => Some((name, uri)),
            None => {
                tracing::warn!("Error encoding image {}: empty payload", name);
                None
            }
        })
        .collect()
}

pub fn encode_data_uri(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    let mime = infer::get(bytes)
        .map(|kind| kind.mime_type())
        .filter(|mime| mime.starts_with("image/"))
        .unwrap_or(DEFAULT_IMAGE_MIME);
    Some(format!("data:{};base64,{}", mime, STANDARD.encode(bytes)))
}

/// Count pages straight from the PDF when the engine did not report it
async fn count_pdf_pages(path: &Path) -> Option<usize> {
    let path: PathBuf = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || {
        lopdf::Document::load(&path).map(|doc| doc.get_pages().len())
    })
    .await;

    match result {
        Ok(Ok(pages)) => Some(pages),
        Ok(Err(e)) => {
            tracing::debug!("Could not count PDF pages: {}", e);
            None
        }
        Err(e) => {
            tracing::warn!("Page counting task failed: {}", e);
            None
        }
    }
}
