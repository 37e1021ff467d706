//! Opaque pagination cursors.
//!
//! A cursor records the last position served from each cohort. It travels
//! as URL-safe base64 of a small versioned JSON document so clients treat
//! it as an opaque token.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use emploi_models::{Cohort, FeedPosition};

use crate::error::{FeedError, FeedResult};

const CURSOR_VERSION: u8 = 1;

/// Decoded pagination state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCursor {
    #[serde(rename = "v")]
    version: u8,
    /// Last certified publication served
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    pub certified: Option<FeedPosition>,
    /// Last regular publication served
    #[serde(rename = "r", default, skip_serializing_if = "Option::is_none")]
    pub regular: Option<FeedPosition>,
}

impl FeedCursor {
    /// Cursor for the first page.
    pub fn start() -> Self {
        Self {
            version: CURSOR_VERSION,
            certified: None,
            regular: None,
        }
    }

    pub fn position(&self, cohort: Cohort) -> Option<FeedPosition> {
        match cohort {
            Cohort::Certified => self.certified,
            Cohort::Regular => self.regular,
        }
    }

    /// Move one cohort forward to `position`.
    pub fn advance(&mut self, cohort: Cohort, position: FeedPosition) {
        match cohort {
            Cohort::Certified => self.certified = Some(position),
            Cohort::Regular => self.regular = Some(position),
        }
    }

    pub fn encode(&self) -> String {
        // Serializing a struct of plain fields cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> FeedResult<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| FeedError::invalid_cursor(format!("not base64: {}", e)))?;
        let cursor: FeedCursor = serde_json::from_slice(&bytes)
            .map_err(|e| FeedError::invalid_cursor(format!("malformed payload: {}", e)))?;

        if cursor.version != CURSOR_VERSION {
            return Err(FeedError::invalid_cursor(format!(
                "unsupported version {}",
                cursor.version
            )));
        }
        Ok(cursor)
    }

    /// Decode an optional request parameter; absent or empty means first page.
    pub fn from_param(param: Option<&str>) -> FeedResult<Self> {
        match param {
            None => Ok(Self::start()),
            Some(s) if s.trim().is_empty() => Ok(Self::start()),
            Some(s) => Self::decode(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_cursor_survives_encoding() {
        let mut cursor = FeedCursor::start();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        cursor.advance(Cohort::Regular, FeedPosition::new(at, 42));

        let token = cursor.encode();
        assert!(!token.contains('='));
        assert!(!token.contains('+') && !token.contains('/'));

        let decoded = FeedCursor::decode(&token).unwrap();
        assert_eq!(decoded, cursor);
        assert_eq!(decoded.position(Cohort::Certified), None);
        assert_eq!(decoded.position(Cohort::Regular).unwrap().id, 42);
    }

    #[test]
    fn test_malformed_cursors_are_rejected() {
        for token in ["%%%", "bm90IGpzb24", &URL_SAFE_NO_PAD.encode(r#"{"v":9}"#)] {
            let err = FeedCursor::decode(token).unwrap_err();
            assert!(matches!(err, FeedError::InvalidCursor(_)), "token {:?}", token);
        }
    }

    #[test]
    fn test_missing_param_starts_from_top() {
        assert_eq!(FeedCursor::from_param(None).unwrap(), FeedCursor::start());
        assert_eq!(FeedCursor::from_param(Some("")).unwrap(), FeedCursor::start());
    }
}
