use regex::Regex;
use std::sync::LazyLock;

use crate::config::{DISPLAY_NAME_MAX_LENGTH, EMOJI_MAX_LENGTH, FILE_PATH_MAX_LENGTH};

/// Matches the 64-char lowercase hex digests carried by `repoId`, `filePath`
/// and `functionId` on the wire.
static HEX_DIGEST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-f]{64}$").expect("static regex is valid"));

pub fn is_hex_digest(value: &str) -> bool {
    HEX_DIGEST.is_match(value) && value.len() <= FILE_PATH_MAX_LENGTH
}

pub fn is_valid_anchor_line(anchor_line: i64) -> bool {
    anchor_line > 0
}

pub fn is_valid_hash_version(hash_version: &str, server_hash_version: &str) -> bool {
    hash_version == server_hash_version
}

/// Identity fields carried by the handshake: non-empty and within length bounds.
pub fn validate_identity(user_id: &str, display_name: &str, emoji: &str) -> Result<(), String> {
    if user_id.trim().is_empty() {
        return Err("identity: userId must not be empty".to_string());
    }
    if display_name.trim().is_empty() {
        return Err("display name must not be empty".to_string());
    }
    if display_name.chars().count() > DISPLAY_NAME_MAX_LENGTH {
        return Err(format!(
            "display name exceeds maximum length of {DISPLAY_NAME_MAX_LENGTH}"
        ));
    }
    if emoji.trim().is_empty() {
        return Err("emoji must not be empty".to_string());
    }
    if emoji.chars().count() > EMOJI_MAX_LENGTH {
        return Err(format!("emoji exceeds maximum length of {EMOJI_MAX_LENGTH}"));
    }
    Ok(())
}

/// Validates a `room:join`/`room:leave`/`edit:push`/`presence:*` room reference.
/// Returns the failing field name's rule so callers can build a `{ ok: false,
/// error }` ack (for `room:join`) or silently drop (every other message).
pub fn validate_room_ref(
    hash_version: &str,
    repo_id: &str,
    file_path: &str,
    server_hash_version: &str,
) -> Result<(), String> {
    if !is_valid_hash_version(hash_version, server_hash_version) {
        return Err(format!("hashVersion must equal '{server_hash_version}'"));
    }
    if !is_hex_digest(repo_id) {
        return Err("repoId must be a 64-character lowercase hex digest".to_string());
    }
    if file_path.is_empty() || file_path.len() > FILE_PATH_MAX_LENGTH {
        return Err(format!(
            "filePath must be non-empty and at most {FILE_PATH_MAX_LENGTH} characters"
        ));
    }
    Ok(())
}

pub fn validate_function_id(function_id: &str) -> Result<(), String> {
    if !is_hex_digest(function_id) {
        return Err("functionId must be a 64-character lowercase hex digest".to_string());
    }
    Ok(())
}
