//! Media write and ingest paths
//!
//! Images ride in two steps: the blob is uploaded first (returning the
//! descriptor the client embeds), then a media record binds the blob to a
//! signet. Only the record creates a local row and a broadcast.

use chrono::{DateTime, Utc};

use super::{RecordError, RecordManager};
use crate::atproto::OAuthClient;
use crate::core::constants::{COLLECTION_MEDIA, COLOR_MAX, NICK_MAX_UTF16};
use crate::data::types::Image;
use crate::domain::records::{BlobRef, MediaEmbed, MediaRecord};
use crate::records::requests::PostMediaRequest;
use crate::utils::text::exceeds_utf16;
use crate::utils::time::datetime_now;

fn validate_media_fields(req: &PostMediaRequest) -> Result<(), RecordError> {
    if let Some(nick) = &req.nick
        && exceeds_utf16(nick, NICK_MAX_UTF16)
    {
        return Err(RecordError::Invalid("nick too long".into()));
    }
    if let Some(color) = req.color
        && color > COLOR_MAX
    {
        return Err(RecordError::Invalid("color out of bounds".into()));
    }
    Ok(())
}

impl RecordManager {
    /// Upload an image blob to the caller's repo host. Returns the blob
    /// descriptor for the follow-up media record.
    pub async fn post_image(
        &self,
        client: &OAuthClient,
        bytes: Vec<u8>,
        mime: &str,
    ) -> Result<BlobRef, RecordError> {
        if !mime.starts_with("image/") {
            return Err(RecordError::Invalid("only image uploads are accepted".into()));
        }
        Ok(client.upload_blob(bytes, mime).await?)
    }

    /// Attach a media record to a signet. Non-image media types are
    /// accepted and ignored, matching the lexicon's open union.
    pub async fn post_media(
        &self,
        client: &OAuthClient,
        req: &PostMediaRequest,
    ) -> Result<(), RecordError> {
        if req.media_type != "image" {
            return Ok(());
        }
        validate_media_fields(req)?;

        let signet_uri = match &req.signet_uri {
            Some(uri) => {
                self.store()
                    .query_signet_handle(uri)
                    .await?
                    .ok_or(RecordError::NotFound("signet"))?;
                uri.clone()
            }
            None => {
                let (channel_uri, message_id) = match (&req.channel_uri, req.message_id) {
                    (Some(curi), Some(mid)) => (curi, mid),
                    _ => {
                        return Err(RecordError::Invalid(
                            "must provide a way to determine the signet".into(),
                        ));
                    }
                };
                let (uri, _) = self
                    .store()
                    .query_signet(channel_uri, message_id)
                    .await?
                    .ok_or(RecordError::NotFound("signet"))?;
                uri
            }
        };

        let (stamp, now) = datetime_now();
        let record = MediaRecord {
            record_type: COLLECTION_MEDIA.to_string(),
            signet_uri,
            media: MediaEmbed {
                image: req.image.clone(),
            },
            nick: req.nick.clone(),
            color: req.color,
            posted_at: stamp,
        };
        let (uri, cid) = client.create_record(COLLECTION_MEDIA, None, &record).await?;

        let image = image_from_record(uri, client.did(), cid, &record, now);
        let was_new = self.store().store_image(&image).await?;
        if was_new {
            self.forward_image(&image).await?;
        }
        Ok(())
    }

    /// Firehose ingest of a media create. Replays are skipped silently.
    pub async fn accept_image(&self, image: Image) -> Result<(), RecordError> {
        let was_new = self.store().store_image(&image).await?;
        if !was_new {
            return Ok(());
        }
        self.forward_image(&image).await
    }

    pub async fn accept_image_update(&self, image: Image) -> Result<(), RecordError> {
        self.store().update_image(&image).await?;
        Ok(())
    }

    pub async fn accept_image_delete(&self, uri: &str) -> Result<(), RecordError> {
        self.store().delete_image(uri).await?;
        Ok(())
    }

    async fn forward_image(&self, image: &Image) -> Result<(), RecordError> {
        let Some(channel_uri) = self.store().get_msg_channel_uri(&image.signet_uri).await? else {
            return Err(RecordError::NotFound("channel for signet"));
        };
        if let Some(broadcaster) = self.broadcaster() {
            broadcaster.broadcast_image(&channel_uri, image).await;
        }
        Ok(())
    }
}

/// Flatten a media record into the stored image row.
pub(crate) fn image_from_record(
    uri: String,
    did: String,
    cid: String,
    record: &MediaRecord,
    posted_at: DateTime<Utc>,
) -> Image {
    let image = record.media.image.as_ref();
    Image {
        uri,
        did,
        cid,
        signet_uri: record.signet_uri.clone(),
        blob_cid: image.map(|i| i.image.link.cid.clone()),
        blob_mime: image.map(|i| i.image.mime_type.clone()),
        alt: image.map(|i| i.alt.clone()).unwrap_or_default(),
        nick: record.nick.clone(),
        color: record.color.map(|c| c as u32),
        width: image.and_then(|i| i.aspect_ratio.as_ref()).map(|a| a.width),
        height: image.and_then(|i| i.aspect_ratio.as_ref()).map(|a| a.height),
        posted_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::records::{AspectRatio, BlobLink, ImageEmbed};

    #[test]
    fn image_row_flattens_blob_and_ratio() {
        let record = MediaRecord {
            record_type: COLLECTION_MEDIA.to_string(),
            signet_uri: "at://did:plc:bk/org.xcvr.lrc.signet/rk".into(),
            media: MediaEmbed {
                image: Some(ImageEmbed {
                    image: BlobRef {
                        blob_type: "blob".into(),
                        link: BlobLink {
                            cid: "bafyblob".into(),
                        },
                        mime_type: "image/png".into(),
                        size: 1234,
                    },
                    alt: "a crab".into(),
                    aspect_ratio: Some(AspectRatio {
                        width: 640,
                        height: 480,
                    }),
                }),
            },
            nick: None,
            color: Some(0x00FF00),
            posted_at: "2026-01-01T00:00:00.000Z".into(),
        };
        let image = image_from_record(
            "at://did:plc:alice/org.xcvr.lrc.media/rk".into(),
            "did:plc:alice".into(),
            "bafyrec".into(),
            &record,
            chrono::Utc::now(),
        );
        assert_eq!(image.blob_cid.as_deref(), Some("bafyblob"));
        assert_eq!(image.blob_mime.as_deref(), Some("image/png"));
        assert_eq!(image.alt, "a crab");
        assert_eq!(image.width, Some(640));
        assert_eq!(image.color, Some(0x00FF00));
    }

    #[test]
    fn media_field_bounds_apply() {
        let req = PostMediaRequest {
            media_type: "image".into(),
            signet_uri: Some("at://did:plc:bk/org.xcvr.lrc.signet/rk".into()),
            channel_uri: None,
            message_id: None,
            image: None,
            nick: Some("n".repeat(NICK_MAX_UTF16 + 1)),
            color: None,
        };
        assert!(validate_media_fields(&req).is_err());
    }
}
