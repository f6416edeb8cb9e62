//! Input checks shared by the HTTP handlers and the service.

use wasa_types::api::SendMessageRequest;
use wasa_types::models::ContentKind;

use crate::error::ApiError;

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 16;
pub const GROUP_NAME_MAX: usize = 64;
pub const EMOJI_MAX_BYTES: usize = 32;

/// Trimmed username, 3 to 16 characters.
pub fn username(raw: &str) -> Result<String, ApiError> {
    let name = raw.trim();
    let len = name.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(ApiError::validation(format!(
            "name must be between {} and {} characters",
            USERNAME_MIN, USERNAME_MAX
        )));
    }
    Ok(name.to_string())
}

pub fn group_name(raw: &str) -> Result<String, ApiError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ApiError::validation("group name is required"));
    }
    if name.chars().count() > GROUP_NAME_MAX {
        return Err(ApiError::validation(format!(
            "group name must be at most {} characters",
            GROUP_NAME_MAX
        )));
    }
    Ok(name.to_string())
}

pub fn photo_url(raw: &str) -> Result<String, ApiError> {
    let url = raw.trim();
    if url.is_empty() {
        return Err(ApiError::validation("photoUrl is required"));
    }
    Ok(url.to_string())
}

/// A single emoji glyph (or ZWJ sequence). Letters, digits and whitespace
/// are rejected so plain text cannot pass as a reaction.
pub fn emoji(raw: &str) -> Result<(), ApiError> {
    if raw.is_empty() {
        return Err(ApiError::validation("emoji is required"));
    }
    if raw.len() > EMOJI_MAX_BYTES {
        return Err(ApiError::validation("emoji is too long"));
    }
    if raw.chars().any(|c| c.is_whitespace() || c.is_ascii_alphanumeric()) {
        return Err(ApiError::validation("emoji must be a single emoji"));
    }
    Ok(())
}

/// Check the kind-specific required fields and return the parsed kind.
pub fn content(req: &SendMessageRequest) -> Result<ContentKind, ApiError> {
    let kind: ContentKind = req
        .content_type
        .parse()
        .map_err(|e| ApiError::validation(format!("{}", e)))?;

    let present = |field: &Option<String>| field.as_deref().is_some_and(|v| !v.trim().is_empty());

    match kind {
        ContentKind::Text => {
            if !present(&req.text) && !present(&req.photo_url) {
                return Err(ApiError::validation("text message needs text or photoUrl"));
            }
        }
        ContentKind::Photo => {
            if !present(&req.photo_url) {
                return Err(ApiError::validation("photo message needs photoUrl"));
            }
        }
        ContentKind::Audio | ContentKind::Document | ContentKind::File => {
            if !present(&req.file_url) {
                return Err(ApiError::validation(format!("{} message needs fileUrl", kind.as_str())));
            }
            if !present(&req.file_name) {
                return Err(ApiError::validation(format!("{} message needs fileName", kind.as_str())));
            }
        }
    }

    Ok(kind)
}
