//! Asset identifiers.
//!
//! Ids are chosen by the uploading client and end up embedded in temp paths and
//! storage keys (`videos/{id}/...`), so they are validated on the way in.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const MAX_VIDEO_ID_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VideoId(String);

impl VideoId {
    /// Validate a client supplied id: 1..=128 characters of `[A-Za-z0-9_-]`.
    pub fn parse(raw: impl Into<String>) -> Result<Self, String> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err("video id must not be empty".to_string());
        }
        if raw.len() > MAX_VIDEO_ID_LEN {
            return Err(format!(
                "video id exceeds {} characters",
                MAX_VIDEO_ID_LEN
            ));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(format!("video id contains invalid characters: {}", raw));
        }
        Ok(VideoId(raw))
    }

    /// Server-side id in the `video_<uuid>` form.
    pub fn generate() -> Self {
        VideoId(format!("video_{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for VideoId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

impl FromStr for VideoId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VideoId::parse(s)
    }
}

impl TryFrom<String> for VideoId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        VideoId::parse(value)
    }
}

impl From<VideoId> for String {
    fn from(id: VideoId) -> Self {
        id.0
    }
}

impl AsRef<str> for VideoId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_client_ids() {
        assert!(VideoId::parse("video_1700000000000").is_ok());
        assert!(VideoId::parse("a-b_C9").is_ok());
    }

    #[test]
    fn test_rejects_path_like_ids() {
        assert!(VideoId::parse("../etc").is_err());
        assert!(VideoId::parse("a/b").is_err());
        assert!(VideoId::parse("").is_err());
        assert!(VideoId::parse("x".repeat(129)).is_err());
    }

    #[test]
    fn test_generated_ids_are_valid() {
        let id = VideoId::generate();
        assert!(id.as_str().starts_with("video_"));
        assert!(VideoId::parse(id.as_str()).is_ok());
    }

    #[test]
    fn test_serde_is_transparent_and_validating() {
        let id: VideoId = serde_json::from_str("\"video_42\"").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"video_42\"");
        assert!(serde_json::from_str::<VideoId>("\"bad/id\"").is_err());
    }
}
