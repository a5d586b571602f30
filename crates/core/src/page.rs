//! Pagination tokens.
//!
//! A query page ends with an opaque [`PageToken`] that resumes the range
//! read exactly where the previous page stopped. The encoding is base64
//! over the JSON-serialized store-native continuation key, which keeps the
//! token order-preserving and stable across serialize/deserialize cycles.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The store-native continuation key: the physical key of the last item the
/// previous page returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationKey {
    #[serde(rename = "$p")]
    pub partition_key: String,
    #[serde(rename = "$s")]
    pub sort_key: String,
}

/// Opaque, resumable pagination handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(String);

impl PageToken {
    pub fn encode(key: &ContinuationKey) -> Result<Self> {
        let json = serde_json::to_vec(key).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Self(URL_SAFE_NO_PAD.encode(json)))
    }

    pub fn decode(&self) -> Result<ContinuationKey> {
        let bytes = URL_SAFE_NO_PAD
            .decode(&self.0)
            .map_err(|e| Error::InvalidPageToken(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| Error::InvalidPageToken(e.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PageToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let key = ContinuationKey {
            partition_key: "UserDoc/id=u1".to_string(),
            sort_key: "ArtworkDoc#a7".to_string(),
        };
        let token = PageToken::encode(&key).unwrap();
        assert_eq!(token.decode().unwrap(), key);
    }

    #[test]
    fn test_token_survives_string_transport() {
        let key = ContinuationKey {
            partition_key: "UserDoc/id=u1".to_string(),
            sort_key: "ArtworkDoc#a7".to_string(),
        };
        let token = PageToken::encode(&key).unwrap();
        let transported = PageToken::from(token.as_str().to_string());
        assert_eq!(transported.decode().unwrap(), key);
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        let err = PageToken::from("not a token!".to_string()).decode().unwrap_err();
        assert!(matches!(err, Error::InvalidPageToken(_)));
    }
}
