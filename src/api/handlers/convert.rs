use crate::AppState;
use crate::api::error::AppError;
use crate::models::ConvertResponse;
use crate::services::temp_store::{StagedFile, StagingError, TempFileStore};
use crate::utils::validation::{ConvertOptions, parse_convert_options, validate_pdf_filename};
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(e.body_text())
    }
}

/// A body stream failure surfaces as a write error; report it as a client problem.
fn staging_error(e: StagingError) -> AppError {
    let from_body = e
        .io_error()
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<MultipartError>());

    match from_body {
        Some(inner) if inner.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
        }
        Some(inner) => AppError::BadRequest(inner.body_text()),
        None => AppError::Staging(e),
    }
}

async fn read_fields(
    store: &TempFileStore,
    multipart: &mut Multipart,
    staged: &mut Option<StagedFile>,
    max_pages: &mut Option<String>,
) -> Result<(), AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if name == "file" {
            if staged.is_some() {
                tracing::warn!("Ignoring extra file field in convert request");
                continue;
            }

            // Reject before anything touches the disk
            let filename = validate_pdf_filename(field.file_name())?.to_string();

            let body_with_io_error = field.map_err(std::io::Error::other);
            let reader = StreamReader::new(body_with_io_error);

            *staged = Some(
                store
                    .stage_stream(&filename, reader)
                    .await
                    .map_err(staging_error)?,
            );
        } else if name == "max_pages" {
            *max_pages = Some(field.text().await.map_err(multipart_error)?);
        }
    }
    Ok(())
}

/// Read the form, staging the PDF. Anything staged is removed again if the
/// rest of the form turns out to be invalid.
async fn receive_upload(
    store: &TempFileStore,
    multipart: &mut Multipart,
) -> Result<(StagedFile, ConvertOptions), AppError> {
    let mut staged = None;
    let mut max_pages = None;

    let result = match read_fields(store, multipart, &mut staged, &mut max_pages).await {
        Ok(()) => parse_convert_options(max_pages.as_deref()).map_err(AppError::from),
        Err(e) => Err(e),
    };

    match (result, staged) {
        (Ok(options), Some(staged)) => Ok((staged, options)),
        (Ok(_), None) => Err(AppError::BadRequest("No file provided".to_string())),
        (Err(e), Some(staged)) => {
            store.remove(&staged.path).await;
            Err(e)
        }
        (Err(e), None) => Err(e),
    }
}

#[utoipa::path(
    post,
    path = "/convert",
    request_body(content = crate::models::ConvertForm, description = "PDF upload", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "PDF converted", body = ConvertResponse),
        (status = 400, description = "Missing file or not a PDF"),
        (status = 413, description = "Upload too large"),
        (status = 500, description = "Conversion engine unavailable or conversion failed")
    ),
    tag = "convert"
)]
pub async fn convert_pdf(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ConvertResponse>, AppError> {
    let (staged, options) = receive_upload(&state.store, &mut multipart).await?;

    // Detached so the staged file is still cleaned up if the client goes away
    let service = state.conversion.clone();
    let response = tokio::spawn(async move {
        service.convert_staged(staged, options.max_pages).await
    })
    .await
    .map_err(|e| AppError::Internal(format!("conversion task failed: {}", e)))??;

    Ok(Json(response))
}
