//! Line authorship nonces
//!
//! When a client opens a line the server acks it with an HMAC nonce binding
//! `(message id, channel uri)` to the channel secret. A backend that later
//! receives a "post this line under my identity" request can recompute the
//! nonce and reject forgeries without keeping per-line state.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the authorship nonce for a line.
///
/// The MAC covers the big-endian message id followed by the channel uri.
pub fn generate_nonce(message_id: u32, channel_uri: &str, secret: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("hmac accepts keys of any length");
    mac.update(&message_id.to_be_bytes());
    mac.update(channel_uri.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_is_deterministic() {
        let a = generate_nonce(2, "at://did:plc:bk/org.xcvr.feed.channel/rk1", "s3cret");
        let b = generate_nonce(2, "at://did:plc:bk/org.xcvr.feed.channel/rk1", "s3cret");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn nonce_varies_with_every_input() {
        let base = generate_nonce(7, "at://did:plc:bk/org.xcvr.feed.channel/rk1", "s3cret");
        assert_ne!(
            base,
            generate_nonce(8, "at://did:plc:bk/org.xcvr.feed.channel/rk1", "s3cret")
        );
        assert_ne!(
            base,
            generate_nonce(7, "at://did:plc:bk/org.xcvr.feed.channel/rk2", "s3cret")
        );
        assert_ne!(
            base,
            generate_nonce(7, "at://did:plc:bk/org.xcvr.feed.channel/rk1", "other")
        );
    }
}
