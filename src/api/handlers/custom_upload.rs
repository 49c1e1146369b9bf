//! POST /frameworks/custom: multipart upload of a user-defined framework.
//!
//! Fields: `file` (JSON array or CSV) and `frameworkName`.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;

use crate::api::{ApiError, AppState};
use crate::upload::UploadMediaType;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub framework_id: String,
    pub control_count: usize,
}

struct UploadedFile {
    bytes: Vec<u8>,
    content_type: Option<String>,
    file_name: Option<String>,
}

pub async fn upload_custom_framework(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart = multipart?;
    let mut file = None;
    let mut framework_name = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let content_type = field.content_type().map(str::to_string);
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await?.to_vec();
                file = Some(UploadedFile {
                    bytes,
                    content_type,
                    file_name,
                });
            }
            Some("frameworkName") => {
                framework_name = Some(field.text().await?);
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| ApiError::bad_request("missing 'file' field"))?;
    let framework_name = framework_name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("missing 'frameworkName' field"))?;

    let media_type =
        UploadMediaType::resolve(file.content_type.as_deref(), file.file_name.as_deref())?;
    let admitted = state
        .uploads
        .admit(&file.bytes, media_type, &framework_name)
        .await?;

    Ok(Json(UploadResponse {
        message: format!(
            "Uploaded {} controls to {}",
            admitted.control_count, admitted.framework_id
        ),
        framework_id: admitted.framework_id,
        control_count: admitted.control_count,
    }))
}
