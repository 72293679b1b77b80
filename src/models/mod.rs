use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Result of a successful `POST /convert`
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConvertResponse {
    pub markdown: String,
    /// Image name -> `data:<mime>;base64,<payload>` URI
    pub images: BTreeMap<String, String>,
    pub metadata: ConversionMetadata,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConversionMetadata {
    /// Filename as sent by the client
    pub filename: String,
    /// Size in bytes of the uploaded PDF
    pub file_size: u64,
    pub page_count: usize,
    /// Processing device the engine ran on
    pub torch_device: String,
    pub timestamp: DateTime<Utc>,
}

/// Multipart form accepted by `POST /convert` (documentation only)
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct ConvertForm {
    /// PDF file to convert
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    /// Maximum number of pages to convert
    pub max_pages: Option<u32>,
}
