//! `at://` record uris

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UriError {
    #[error("not an at:// uri: {0}")]
    BadScheme(String),
    #[error("at:// uri missing {0}")]
    MissingPart(&'static str),
}

/// A parsed record uri: `at://<did>/<collection>/<rkey>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AtUri {
    pub did: String,
    pub collection: String,
    pub rkey: String,
}

impl AtUri {
    pub fn new(
        did: impl Into<String>,
        collection: impl Into<String>,
        rkey: impl Into<String>,
    ) -> Self {
        Self {
            did: did.into(),
            collection: collection.into(),
            rkey: rkey.into(),
        }
    }

    pub fn parse(uri: &str) -> Result<Self, UriError> {
        let rest = uri
            .strip_prefix("at://")
            .ok_or_else(|| UriError::BadScheme(uri.to_string()))?;
        let mut parts = rest.splitn(3, '/');
        let did = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or(UriError::MissingPart("authority"))?;
        let collection = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or(UriError::MissingPart("collection"))?;
        let rkey = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or(UriError::MissingPart("rkey"))?;
        Ok(Self::new(did, collection, rkey))
    }
}

impl fmt::Display for AtUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at://{}/{}/{}", self.did, self.collection, self.rkey)
    }
}

/// The authority (did) of a record uri.
pub fn did_from_uri(uri: &str) -> Result<String, UriError> {
    Ok(AtUri::parse(uri)?.did)
}

/// The record key of a record uri.
pub fn rkey_from_uri(uri: &str) -> Result<String, UriError> {
    Ok(AtUri::parse(uri)?.rkey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        let uri = "at://did:plc:abc123/org.xcvr.feed.channel/3kxyz";
        let parsed = AtUri::parse(uri).unwrap();
        assert_eq!(parsed.did, "did:plc:abc123");
        assert_eq!(parsed.collection, "org.xcvr.feed.channel");
        assert_eq!(parsed.rkey, "3kxyz");
        assert_eq!(parsed.to_string(), uri);
    }

    #[test]
    fn rejects_foreign_schemes_and_truncated_uris() {
        assert_eq!(
            AtUri::parse("https://example.com/x"),
            Err(UriError::BadScheme("https://example.com/x".into()))
        );
        assert_eq!(
            AtUri::parse("at://did:plc:abc/org.xcvr.feed.channel"),
            Err(UriError::MissingPart("rkey"))
        );
        assert_eq!(AtUri::parse("at://"), Err(UriError::MissingPart("authority")));
    }

    #[test]
    fn helpers_extract_parts() {
        let uri = "at://did:plc:bk/org.xcvr.lrc.signet/rk9";
        assert_eq!(did_from_uri(uri).unwrap(), "did:plc:bk");
        assert_eq!(rkey_from_uri(uri).unwrap(), "rk9");
    }
}
