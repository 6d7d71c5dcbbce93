//! Profile write and ingest paths

use super::{RecordError, RecordManager};
use crate::atproto::{OAuthClient, SessionData};
use crate::core::constants::{
    COLLECTION_PROFILE, COLOR_MAX, DEFAULT_PROFILE_COLOR, DEFAULT_PROFILE_NICK,
    DEFAULT_PROFILE_STATUS, NICK_MAX_UTF16, STATUS_MAX_GRAPHEMES, STATUS_MAX_UTF16,
    TITLE_MAX_GRAPHEMES, TITLE_MAX_UTF16,
};
use crate::data::types::ProfilePatch;
use crate::domain::records::ProfileRecord;
use crate::records::requests::PostProfileRequest;
use crate::utils::text::{exceeds_bounds, exceeds_utf16};

const PROFILE_RKEY: &str = "self";

fn validate_profile(req: &PostProfileRequest) -> Result<(), RecordError> {
    if let Some(name) = &req.display_name
        && exceeds_bounds(name, TITLE_MAX_GRAPHEMES, TITLE_MAX_UTF16)
    {
        return Err(RecordError::Invalid("display name too long".into()));
    }
    if let Some(nick) = &req.default_nick
        && exceeds_utf16(nick, NICK_MAX_UTF16)
    {
        return Err(RecordError::Invalid("nick too long".into()));
    }
    if let Some(status) = &req.status
        && exceeds_bounds(status, STATUS_MAX_GRAPHEMES, STATUS_MAX_UTF16)
    {
        return Err(RecordError::Invalid("status too long".into()));
    }
    if let Some(color) = req.color
        && color > COLOR_MAX
    {
        return Err(RecordError::Invalid("color out of bounds".into()));
    }
    Ok(())
}

fn patch_from_record(record: &ProfileRecord, record_cid: Option<String>) -> ProfilePatch {
    ProfilePatch {
        display_name: record.display_name.clone(),
        default_nick: record.default_nick.clone(),
        status: record.status.clone(),
        avatar_cid: record.avatar.as_ref().map(|b| b.link.cid.clone()),
        avatar_mime: record.avatar.as_ref().map(|b| b.mime_type.clone()),
        color: record.color,
        record_cid,
    }
}

impl RecordManager {
    /// Update the caller's profile record (create when missing) and mirror
    /// the fields locally.
    pub async fn post_profile(
        &self,
        client: &OAuthClient,
        req: &PostProfileRequest,
    ) -> Result<(), RecordError> {
        validate_profile(req)?;
        let record = ProfileRecord {
            record_type: COLLECTION_PROFILE.to_string(),
            display_name: req.display_name.clone(),
            default_nick: req.default_nick.clone(),
            status: req.status.clone(),
            avatar: req.avatar.clone(),
            color: req.color,
        };

        // Swap against the current record if one exists so concurrent
        // writers cannot silently clobber each other.
        let existing = client.get_record(COLLECTION_PROFILE, PROFILE_RKEY).await?;
        let swap_cid = existing.and_then(|out| out.cid);
        let (_, cid) = client
            .put_record(COLLECTION_PROFILE, PROFILE_RKEY, &record, swap_cid)
            .await?;

        self.store()
            .upsert_profile(&client.did(), &patch_from_record(&record, Some(cid)))
            .await?;
        Ok(())
    }

    /// First-login bootstrap: a default profile record in the user's repo
    /// and the matching local row. Existing rows and records win.
    pub async fn create_initial_profile(&self, session: &SessionData) -> Result<(), RecordError> {
        let client = self
            .service()
            .resume_session(&session.did, &session.session_id)
            .await?
            .ok_or(RecordError::NotFound("session"))?;

        let display_name = self
            .store()
            .resolve_did(&session.did)
            .await?
            .unwrap_or_else(|| session.did.clone());

        if client.get_record(COLLECTION_PROFILE, PROFILE_RKEY).await?.is_none() {
            let record = ProfileRecord {
                record_type: COLLECTION_PROFILE.to_string(),
                display_name: Some(display_name.clone()),
                default_nick: Some(DEFAULT_PROFILE_NICK.to_string()),
                status: Some(DEFAULT_PROFILE_STATUS.to_string()),
                avatar: None,
                color: Some(DEFAULT_PROFILE_COLOR),
            };
            client
                .create_record(COLLECTION_PROFILE, Some(PROFILE_RKEY), &record)
                .await?;
        }

        self.store()
            .initialize_profile(
                &session.did,
                &display_name,
                DEFAULT_PROFILE_NICK,
                DEFAULT_PROFILE_STATUS,
                DEFAULT_PROFILE_COLOR,
            )
            .await?;
        Ok(())
    }

    /// Firehose ingest of a profile create or update.
    pub async fn accept_profile(
        &self,
        record: ProfileRecord,
        did: &str,
        cid: Option<String>,
    ) -> Result<(), RecordError> {
        self.store()
            .upsert_profile(did, &patch_from_record(&record, cid))
            .await?;
        Ok(())
    }

    /// Tombstone ingest; only removes the row when the CID matches.
    pub async fn accept_profile_delete(&self, did: &str, cid: &str) -> Result<(), RecordError> {
        self.store().delete_profile(did, cid).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_boundary_is_six_forty_graphemes() {
        let ok = PostProfileRequest {
            status: Some("s".repeat(STATUS_MAX_GRAPHEMES)),
            ..Default::default()
        };
        assert!(validate_profile(&ok).is_ok());
        let too_long = PostProfileRequest {
            status: Some("s".repeat(STATUS_MAX_GRAPHEMES + 1)),
            ..Default::default()
        };
        assert!(validate_profile(&too_long).is_err());
    }

    #[test]
    fn color_and_nick_bounds_apply() {
        let bad_color = PostProfileRequest {
            color: Some(COLOR_MAX + 1),
            ..Default::default()
        };
        assert!(validate_profile(&bad_color).is_err());
        let bad_nick = PostProfileRequest {
            default_nick: Some("n".repeat(NICK_MAX_UTF16 + 1)),
            ..Default::default()
        };
        assert!(validate_profile(&bad_nick).is_err());
        assert!(validate_profile(&PostProfileRequest::default()).is_ok());
    }

    #[test]
    fn patch_mirrors_record_fields() {
        let record = ProfileRecord {
            record_type: COLLECTION_PROFILE.to_string(),
            display_name: Some("Alice".into()),
            default_nick: None,
            status: Some("around".into()),
            avatar: None,
            color: Some(0xABCDEF),
        };
        let patch = patch_from_record(&record, Some("bafycid".into()));
        assert_eq!(patch.display_name.as_deref(), Some("Alice"));
        assert!(patch.default_nick.is_none());
        assert_eq!(patch.color, Some(0xABCDEF));
        assert_eq!(patch.record_cid.as_deref(), Some("bafycid"));
    }
}
