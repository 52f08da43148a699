//! Completion and abort protocol

use super::session::{PartRecord, UploadSession};
use super::UploadError;
use crate::backend::{
    AbortRequest, BearerToken, CompleteRequest, CompletedPart, StorageBackend,
};
use crate::metrics;
use tracing::{info, warn};

/// Build the Complete part list: every part `1..=part_count`, sorted, each with its tag
pub fn ordered_part_list(
    part_count: u32,
    parts: &[PartRecord],
) -> Result<Vec<CompletedPart>, UploadError> {
    let mut list: Vec<CompletedPart> = parts
        .iter()
        .filter(|p| p.is_completed())
        .map(|p| {
            p.integrity_tag
                .clone()
                .map(|integrity_tag| CompletedPart {
                    part_number: p.part_number,
                    integrity_tag,
                })
                .ok_or_else(|| {
                    UploadError::InvalidPartList(format!(
                        "part {} completed without an integrity tag",
                        p.part_number
                    ))
                })
        })
        .collect::<Result<_, _>>()?;

    list.sort_by_key(|p| p.part_number);

    if list.len() != part_count as usize {
        return Err(UploadError::InvalidPartList(format!(
            "{} of {} parts completed",
            list.len(),
            part_count
        )));
    }
    for (expected, part) in (1..=part_count).zip(&list) {
        if part.part_number != expected {
            return Err(UploadError::InvalidPartList(format!(
                "expected part {}, found part {}",
                expected, part.part_number
            )));
        }
    }

    Ok(list)
}

/// Ask the backend to stitch the parts, returning the final object locator.
///
/// Not retried: a failed completion means the session is unusable.
#[tracing::instrument(
    name = "upload.complete",
    skip(backend, token, session, parts),
    fields(upload_id = %session.upload_id, object_key = %session.object_key, part_count = session.part_count),
    err
)]
pub async fn complete_upload(
    backend: &dyn StorageBackend,
    token: &BearerToken,
    session: &UploadSession,
    parts: &[PartRecord],
) -> Result<String, UploadError> {
    let parts = ordered_part_list(session.part_count, parts)?;
    let request = CompleteRequest {
        object_key: session.object_key.clone(),
        upload_id: session.upload_id.clone(),
        parts,
    };

    let response = backend
        .complete(token, &request)
        .await
        .map_err(UploadError::Completion)?;

    info!(locator = %response.final_object_locator, "Upload completed");
    Ok(response.final_object_locator)
}

/// Best-effort release of the server-side reservation.
///
/// Failures are logged, never returned. Returns whether the backend
/// acknowledged the abort.
#[tracing::instrument(name = "upload.abort", skip(backend, token))]
pub async fn abort_upload(
    backend: &dyn StorageBackend,
    token: &BearerToken,
    upload_id: &str,
    object_key: &str,
) -> bool {
    let request = AbortRequest {
        object_key: object_key.to_string(),
        upload_id: upload_id.to_string(),
    };

    match backend.abort(token, &request).await {
        Ok(()) => {
            info!("Upload aborted");
            metrics::record_abort(true);
            true
        }
        Err(e) => {
            warn!(error = %e, "Abort failed; session left for server-side cleanup");
            metrics::record_abort(false);
            false
        }
    }
}
