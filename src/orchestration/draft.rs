//! Draft request construction
//!
//! Picks the release note for the target locale, reads it and assembles the
//! wire request together with the publish type and SEO tag ids.

use crate::core::config::{PublishConfig, ReleaseNote};
use crate::core::error::{PublishError, Result};
use crate::core::traits::DraftRequest;
use tokio::fs;
use tracing::{debug, warn};

/// Maximum length of the "what's new" text, in characters
pub const MAX_WHATS_NEW_CHARS: usize = 500;

/// Builds the [`DraftRequest`] for a publish run
pub struct DraftBuilder<'a> {
    config: &'a PublishConfig,
}

impl<'a> DraftBuilder<'a> {
    pub fn new(config: &'a PublishConfig) -> Self {
        Self { config }
    }

    /// Read the selected release note and assemble the request
    pub async fn build(&self) -> Result<DraftRequest> {
        let whats_new = match select_release_note(self.config.release_notes(), self.config.target_locale()) {
            Some(note) => read_release_note(note).await?,
            None => {
                debug!("No release notes configured");
                String::new()
            }
        };

        Ok(DraftRequest {
            whats_new,
            publish_type: self.config.publish_type().as_wire().to_string(),
            seo_tag_ids: self.config.seo_tags().iter().map(|tag| tag.id()).collect(),
        })
    }
}

/// Select the release note for `locale`
///
/// Exact match first (case-insensitive), then a match on the primary
/// subtag, so `ru` serves `ru-RU` and the other way round, then the first
/// note.
pub fn select_release_note<'n>(notes: &'n [ReleaseNote], locale: &str) -> Option<&'n ReleaseNote> {
    let primary = |lang: &str| {
        lang.split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase()
    };

    notes
        .iter()
        .find(|note| note.lang.eq_ignore_ascii_case(locale))
        .or_else(|| notes.iter().find(|note| primary(&note.lang) == primary(locale)))
        .or_else(|| {
            let first = notes.first();
            if let Some(note) = first {
                warn!(
                    "No release note for locale {}, using `{}`",
                    locale, note.lang
                );
            }
            first
        })
}

async fn read_release_note(note: &ReleaseNote) -> Result<String> {
    let content = fs::read_to_string(&note.file_path).await.map_err(|e| {
        PublishError::config(
            "releaseNotes",
            format!(
                "cannot read release note `{}` from {}: {}",
                note.lang,
                note.file_path.display(),
                e
            ),
        )
    })?;

    let text = content.trim().to_string();
    let length = text.chars().count();
    if length > MAX_WHATS_NEW_CHARS {
        return Err(PublishError::config(
            "releaseNotes",
            format!(
                "release note `{}` is {} characters long, the limit is {}",
                note.lang, length, MAX_WHATS_NEW_CHARS
            ),
        ));
    }

    debug!("Using release note `{}` ({} characters)", note.lang, length);
    Ok(text)
}
