use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};
use uuid::Uuid;

use stride_db::queries::ProfileChanges;
use stride_types::api::{
    Claims, ImageKind, ProfileResponse, SearchQuery, UpdateProfileRequest, UploadImageResponse,
};
use stride_types::models::{ConnectionStatus, UserSummary};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::{blocking, required_text};

/// 5 MB limit for profile images
pub const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024;
/// Request body limit for the upload route; leaves room for multipart framing.
pub const UPLOAD_BODY_LIMIT: usize = MAX_IMAGE_SIZE + 64 * 1024;

const SEARCH_LIMIT: u32 = 20;
const MAX_LIST_ITEMS: usize = 20;
const MAX_LIST_ITEM_CHARS: usize = 50;

/// GET /users/me
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    let (user, profile) = blocking(&state, move |db| {
        let user = db.get_user(me)?;
        let profile = db.get_profile(me)?;
        Ok((user, profile))
    })
    .await?;
    // A valid token for a deleted account.
    let user = user.ok_or(ApiError::Unauthorized)?;

    Ok(Json(ProfileResponse {
        user: UserSummary::from(&user),
        is_self: true,
        connection_status: None,
        avatar_url: profile.avatar_url.clone(),
        cover_url: profile.cover_url.clone(),
        profile: Some(profile),
    }))
}

/// GET /users/search?q=
pub async fn search(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Query(query), _): WithRejection<Query<SearchQuery>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let q = query.q.trim().to_string();
    if q.chars().count() < 2 {
        return Err(ApiError::bad_request("search query must be at least 2 characters"));
    }

    let me = claims.sub;
    let users = blocking(&state, move |db| db.search_users(&q, me, SEARCH_LIMIT)).await?;
    Ok(Json(users.iter().map(UserSummary::from).collect::<Vec<_>>()))
}

/// GET /users/{user_id}/profile
///
/// Everyone sees the summary and images; the rest is for the owner and
/// accepted connections.
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(user_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    let (user, profile, status) = blocking(&state, move |db| {
        let user = db.get_user(user_id)?;
        let profile = db.get_profile(user_id)?;
        let status = if user_id == me {
            None
        } else {
            db.connection_status_between(me, user_id)?
        };
        Ok((user, profile, status))
    })
    .await?;
    let user = user.ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    let is_self = user_id == me;
    let visible = is_self || status == Some(ConnectionStatus::Accepted);

    Ok(Json(ProfileResponse {
        user: UserSummary::from(&user),
        is_self,
        connection_status: status,
        avatar_url: profile.avatar_url.clone(),
        cover_url: profile.cover_url.clone(),
        profile: visible.then_some(profile),
    }))
}

fn normalize_list(field: &str, items: Vec<String>) -> Result<Vec<String>, ApiError> {
    if items.len() > MAX_LIST_ITEMS {
        return Err(ApiError::bad_request(format!(
            "{field} may hold at most {MAX_LIST_ITEMS} entries"
        )));
    }
    if items.iter().any(|i| i.chars().count() > MAX_LIST_ITEM_CHARS) {
        return Err(ApiError::bad_request(format!(
            "{field} entries must be at most {MAX_LIST_ITEM_CHARS} characters"
        )));
    }
    Ok(items)
}

fn bounded(field: &str, value: Option<String>, max: usize) -> Result<Option<String>, ApiError> {
    match value {
        Some(v) if v.chars().count() > max => Err(ApiError::bad_request(format!(
            "{field} must be at most {max} characters"
        ))),
        other => Ok(other.map(|v| v.trim().to_string())),
    }
}

/// PUT /users/profile
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<UpdateProfileRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let changes = ProfileChanges {
        display_name: req
            .display_name
            .as_deref()
            .map(|name| required_text("display_name", name, 64))
            .transpose()?,
        bio: bounded("bio", req.bio, 1000)?,
        location: bounded("location", req.location, 200)?,
        sports: req
            .sports
            .map(|s| normalize_list("sports", s.into_vec()))
            .transpose()?,
        tags: req
            .tags
            .map(|t| normalize_list("tags", t.into_vec()))
            .transpose()?,
    };

    let me = claims.sub;
    let (user, profile) = blocking(&state, move |db| {
        let profile = db.update_profile(me, changes)?;
        Ok((db.get_user(me)?, profile))
    })
    .await?;
    let user = user.ok_or(ApiError::Unauthorized)?;

    Ok(Json(ProfileResponse {
        user: UserSummary::from(&user),
        is_self: true,
        connection_status: None,
        avatar_url: profile.avatar_url.clone(),
        cover_url: profile.cover_url.clone(),
        profile: Some(profile),
    }))
}

/// File extension for a supported image, judged by its leading bytes.
pub fn sniff_image(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("webp")
    } else {
        None
    }
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(format!("image exceeds {MAX_IMAGE_SIZE} bytes"))
    } else {
        ApiError::bad_request(format!("malformed upload: {}", e.body_text()))
    }
}

/// POST /users/profile/upload-image, multipart with `type` (avatar|cover) and `file`.
///
/// Stored as `<sha256>.<ext>` in the upload dir, so re-uploading the same image
/// reuses the file.
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(mut multipart, _): WithRejection<Multipart, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let mut kind: Option<ImageKind> = None;
    let mut data = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("type") => {
                let text = field.text().await.map_err(multipart_error)?;
                kind = Some(
                    text.trim()
                        .parse()
                        .map_err(|_| ApiError::bad_request("type must be avatar or cover"))?,
                );
            }
            Some("file") => data = Some(field.bytes().await.map_err(multipart_error)?),
            _ => {}
        }
    }

    let kind = kind.ok_or_else(|| ApiError::bad_request("missing `type` field"))?;
    let bytes = data.ok_or_else(|| ApiError::bad_request("missing `file` field"))?;

    if bytes.is_empty() {
        return Err(ApiError::bad_request("file is empty"));
    }
    if bytes.len() > MAX_IMAGE_SIZE {
        warn!("Rejected {} byte image from {}", bytes.len(), claims.sub);
        return Err(ApiError::PayloadTooLarge(format!(
            "image exceeds {MAX_IMAGE_SIZE} bytes"
        )));
    }
    let ext = sniff_image(&bytes)
        .ok_or_else(|| ApiError::bad_request("only PNG, JPEG and WebP images are accepted"))?;

    let file_name = format!("{}.{}", hex::encode(Sha256::digest(&bytes)), ext);

    // Ensure uploads directory exists
    tokio::fs::create_dir_all(&state.upload_dir)
        .await
        .map_err(|e| {
            error!("Failed to create upload directory {}: {}", state.upload_dir.display(), e);
            ApiError::Internal
        })?;

    let file_path = state.upload_dir.join(&file_name);
    let mut file = tokio::fs::File::create(&file_path).await.map_err(|e| {
        error!("Failed to create file {}: {}", file_path.display(), e);
        ApiError::Internal
    })?;
    file.write_all(&bytes).await.map_err(|e| {
        error!("Failed to write file {}: {}", file_path.display(), e);
        ApiError::Internal
    })?;

    let url = format!("/uploads/{file_name}");
    let me = claims.sub;
    let stored = url.clone();
    blocking(&state, move |db| db.set_profile_image(me, kind, &stored)).await?;

    info!("Stored {:?} image {} for {}", kind, file_name, me);
    Ok((
        StatusCode::CREATED,
        Json(UploadImageResponse {
            kind,
            url,
            size: bytes.len() as u64,
        }),
    ))
}
