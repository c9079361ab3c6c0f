//! SEO category tags attached to a store listing

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of fixed SEO categories known to the store
pub const SEO_TAG_COUNT: u16 = 172;

/// A fixed SEO category, identified on the wire by its integer id
///
/// Tags are configured by id only (`seoTags: [3, 17]`); symbolic tag names
/// are not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SeoTag(u16);

impl SeoTag {
    /// Look up a tag by its store id
    pub fn from_id(id: u16) -> Option<Self> {
        (1..=SEO_TAG_COUNT).contains(&id).then_some(Self(id))
    }

    pub fn id(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for SeoTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SeoTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id: u16 = s
            .trim()
            .parse()
            .map_err(|_| format!("SEO tag must be a numeric id, got `{}`", s))?;
        Self::from_id(id).ok_or_else(|| {
            format!("unknown SEO tag id {} (expected 1..={})", id, SEO_TAG_COUNT)
        })
    }
}

impl<'de> Deserialize<'de> for SeoTag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum TagHelper {
            Id(u16),
            Text(String),
        }

        match TagHelper::deserialize(deserializer)? {
            TagHelper::Id(id) => Self::from_id(id).ok_or_else(|| {
                serde::de::Error::custom(format!(
                    "unknown SEO tag id {} (expected 1..={})",
                    id, SEO_TAG_COUNT
                ))
            }),
            TagHelper::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}
