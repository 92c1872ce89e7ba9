use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tokio_util::io::ReaderStream;
use tracing::error;

use crate::entities::order::PaymentStatus;
use crate::errors::ServiceError;
use crate::AppState;

/// Serves the digital asset behind a download token as a streamed body.
///
/// The download is claimed (conditional increment against the cap) only
/// after the asset opens, so a missing file never consumes a download, and
/// the conditional claim means concurrent fetches can never exceed the cap.
/// Expiry and exhaustion both revoke the token as a side effect of being
/// observed.
#[utoipa::path(
    get,
    path = "/api/download/{token}",
    params(("token" = String, Path, description = "Opaque download token")),
    responses(
        (status = 200, description = "Asset bytes with attachment disposition"),
        (status = 403, description = "Owning order is not paid"),
        (status = 404, description = "Unknown or revoked token"),
        (status = 410, description = "Token expired or download limit reached"),
        (status = 500, description = "Asset missing from storage")
    )
)]
pub async fn serve_download(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response, ServiceError> {
    let entitlement = state
        .services
        .downloads
        .get_token(&token)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Download not found".into()))?;

    if entitlement.is_expired(Utc::now()) {
        state.services.downloads.revoke(&token).await?;
        return Err(ServiceError::Gone("Download link has expired".into()));
    }

    let paid = state
        .services
        .orders
        .get_order(entitlement.order_id)
        .await?
        .map(|order| order.payment_status == PaymentStatus::Paid)
        .unwrap_or(false);
    if !paid {
        return Err(ServiceError::Forbidden(
            "Download is not available for this order".into(),
        ));
    }

    if entitlement.is_exhausted() {
        state.services.downloads.revoke(&token).await?;
        return Err(ServiceError::Gone("Download limit reached".into()));
    }

    let file = tokio::fs::File::open(&entitlement.file_path)
        .await
        .map_err(|e| {
            error!(path = %entitlement.file_path, "digital asset unreadable: {}", e);
            ServiceError::Internal(format!("asset missing: {}", entitlement.file_path))
        })?;

    // Lost race against a concurrent fetch claiming the final download.
    if !state.services.downloads.record_download(&token).await? {
        state.services.downloads.revoke(&token).await?;
        return Err(ServiceError::Gone("Download limit reached".into()));
    }

    let content_type = HeaderValue::from_str(&entitlement.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        entitlement.file_name.replace(['"', '\r', '\n'], "")
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}
