//! Content identity for source documents.
//!
//! Every bundle pins its source document by a sha256 hex digest. The digest
//! is taken from the first available of: the caller's explicit hash, the
//! resolved text, the file bytes, the base64 PDF, the base64 image. When none
//! exists a synthetic seed `claimId:fileName:text` is hashed instead and the
//! outcome is marked recoverable.

use crate::document::Document;
use crate::outcome::StageOutcome;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

/// Where a [`ContentHash`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashSource {
    Provided,
    Text,
    File,
    Base64Pdf,
    ImageBase64,
    SyntheticSeed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentHash {
    pub value: String,
    pub source: HashSource,
}

pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(bytes.as_ref()))
}

fn hashed(bytes: impl AsRef<[u8]>, source: HashSource) -> StageOutcome<ContentHash> {
    StageOutcome::Ok(ContentHash {
        value: sha256_hex(bytes),
        source,
    })
}

/// Resolve the content hash of `document`.
///
/// Never fatal. An unreadable file is logged and the chain moves on.
pub async fn content_hash(
    claim_id: &str,
    document: &Document,
    resolved_text: &str,
) -> StageOutcome<ContentHash> {
    if let Some(explicit) = document.sha256.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        return StageOutcome::Ok(ContentHash {
            value: explicit.to_string(),
            source: HashSource::Provided,
        });
    }

    if !resolved_text.is_empty() {
        return hashed(resolved_text, HashSource::Text);
    }

    if let Some(path) = document.file_path() {
        match tokio::fs::read(path).await {
            Ok(bytes) => return hashed(bytes, HashSource::File),
            Err(e) => warn!(
                file_name = %document.file_name,
                "Cannot read '{}' for hashing: {}", path, e
            ),
        }
    }

    if let Some(pdf) = document.base64_pdf() {
        return hashed(pdf, HashSource::Base64Pdf);
    }

    if let Some(image) = document.image_base64() {
        return hashed(image, HashSource::ImageBase64);
    }

    warn!(
        claim_id,
        file_name = %document.file_name,
        "No content available for hashing; using synthetic seed"
    );
    let seed = format!("{claim_id}:{}:{resolved_text}", document.file_name);
    StageOutcome::recoverable(
        ContentHash {
            value: sha256_hex(seed),
            source: HashSource::SyntheticSeed,
        },
        "no_content_available_for_hash",
    )
}
