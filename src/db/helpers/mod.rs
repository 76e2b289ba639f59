use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use image::GenericImageView;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::db::models::Dimensions;

/// Namespace for deterministic baseline ids.
const BASELINE_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_52a4_8d0e_4b7a_9a55_3c2e_1f0b_7d94);

/// Prefix under which repository-managed image bytes are stored.
pub const IMAGE_PREFIX: &str = "baseline-images/";

/// Content hash of image bytes (lowercase hex SHA-256).
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Deterministic id for one logical baseline context. Re-saving the same
/// context with the same commit always yields the same id.
pub fn baseline_id(
    owner: &str,
    repo: &str,
    branch: &str,
    route: &str,
    viewport: &str,
    commit: &str,
) -> String {
    let name = [owner, repo, branch, route, viewport, commit].join("\0");
    Uuid::new_v5(&BASELINE_ID_NAMESPACE, name.as_bytes()).to_string()
}

/// Storage path derived from a content fingerprint.
pub fn image_storage_path(fingerprint: &str) -> String {
    let shard = fingerprint.get(..2).unwrap_or("00");
    format!("{IMAGE_PREFIX}{shard}/{fingerprint}.png")
}

pub fn image_dimensions(bytes: &[u8]) -> Result<Dimensions> {
    let img = image::load_from_memory(bytes).context("failed to decode image bytes")?;
    let (width, height) = img.dimensions();
    Ok(Dimensions { width, height })
}

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_sha256_hex() {
        assert_eq!(
            fingerprint(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn baseline_id_is_deterministic() {
        let a = baseline_id("acme", "web", "main", "/", "1920x1080", "abc123");
        let b = baseline_id("acme", "web", "main", "/", "1920x1080", "abc123");
        let c = baseline_id("acme", "web", "main", "/", "1920x1080", "def456");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn baseline_id_fields_do_not_bleed_together() {
        let a = baseline_id("ac", "me", "main", "/", "1x1", "c");
        let b = baseline_id("a", "cme", "main", "/", "1x1", "c");
        assert_ne!(a, b);
    }

    #[test]
    fn storage_path_is_sharded_by_fingerprint() {
        let fp = fingerprint(b"abc");
        assert_eq!(
            image_storage_path(&fp),
            format!("baseline-images/ba/{fp}.png")
        );
    }
}
