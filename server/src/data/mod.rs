//! Data layer
//!
//! [`Store`] is the backend's durable, derived view of the network. It owns
//! the connection pool and fronts the repository modules with one method per
//! contract operation. Everything is idempotent under replay: inserts are
//! conditional and report `was_new`, updates are upserts of mutable fields.

pub mod error;
pub mod postgres;
pub mod types;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::core::config::PostgresConfig;
use crate::domain::views::{ChannelView, ProfileView, SignedMessageView};
use error::StoreError;
use postgres::repositories::{bans, channels, identity, images, messages, oauth, profiles, signets};
use types::{
    Ban, Channel, ChannelHead, Image, Message, OAuthRequestRow, OAuthSessionRow, Profile,
    ProfilePatch, Signet,
};

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Connect, migrate, and wrap the pool.
    pub async fn init(config: &PostgresConfig) -> Result<Self, StoreError> {
        let pool = postgres::init(config).await?;
        Ok(Self { pool })
    }

    // --- identity ---

    pub async fn store_did_handle(&self, did: &str, handle: &str) -> Result<(), StoreError> {
        identity::store_did_handle(&self.pool, did, handle).await
    }

    pub async fn refresh_did_handle(&self, did: &str, handle: &str) -> Result<(), StoreError> {
        identity::refresh_did_handle(&self.pool, did, handle).await
    }

    pub async fn resolve_handle(&self, handle: &str) -> Result<Option<String>, StoreError> {
        identity::resolve_handle(&self.pool, handle).await
    }

    pub async fn resolve_did(&self, did: &str) -> Result<Option<String>, StoreError> {
        identity::resolve_did(&self.pool, did).await
    }

    // --- profiles ---

    pub async fn initialize_profile(
        &self,
        did: &str,
        display_name: &str,
        default_nick: &str,
        status: &str,
        color: u64,
    ) -> Result<(), StoreError> {
        profiles::initialize_profile(&self.pool, did, display_name, default_nick, status, color)
            .await
    }

    pub async fn upsert_profile(&self, did: &str, patch: &ProfilePatch) -> Result<(), StoreError> {
        profiles::upsert_profile(&self.pool, did, patch).await
    }

    pub async fn delete_profile(&self, did: &str, cid: &str) -> Result<(), StoreError> {
        profiles::delete_profile(&self.pool, did, cid).await
    }

    pub async fn get_profile(&self, did: &str) -> Result<Option<Profile>, StoreError> {
        profiles::get_profile(&self.pool, did).await
    }

    pub async fn get_profile_view(&self, did: &str) -> Result<Option<ProfileView>, StoreError> {
        profiles::get_profile_view(&self.pool, did).await
    }

    // --- channels ---

    pub async fn store_channel(&self, channel: &Channel) -> Result<bool, StoreError> {
        channels::store_channel(&self.pool, channel).await
    }

    pub async fn update_channel(&self, channel: &Channel) -> Result<(), StoreError> {
        channels::update_channel(&self.pool, channel).await
    }

    pub async fn delete_channel(&self, uri: &str) -> Result<(), StoreError> {
        channels::delete_channel(&self.pool, uri).await
    }

    pub async fn get_channel(&self, uri: &str) -> Result<Option<Channel>, StoreError> {
        channels::get_channel(&self.pool, uri).await
    }

    pub async fn get_channel_views(&self, limit: i64) -> Result<Vec<ChannelView>, StoreError> {
        channels::get_channel_views(&self.pool, limit).await
    }

    pub async fn get_channel_view(&self, uri: &str) -> Result<Option<ChannelView>, StoreError> {
        channels::get_channel_view(&self.pool, uri).await
    }

    pub async fn get_channel_heads(&self) -> Result<Vec<ChannelHead>, StoreError> {
        channels::get_channel_heads(&self.pool).await
    }

    // --- signets ---

    pub async fn store_signet(&self, signet: &Signet) -> Result<bool, StoreError> {
        signets::store_signet(&self.pool, signet).await
    }

    pub async fn update_signet(&self, signet: &Signet) -> Result<(), StoreError> {
        signets::update_signet(&self.pool, signet).await
    }

    pub async fn delete_signet(&self, uri: &str) -> Result<(), StoreError> {
        signets::delete_signet(&self.pool, uri).await
    }

    pub async fn query_signet(
        &self,
        channel_uri: &str,
        message_id: u32,
    ) -> Result<Option<(String, String)>, StoreError> {
        signets::query_signet(&self.pool, channel_uri, message_id).await
    }

    pub async fn query_signet_handle(&self, uri: &str) -> Result<Option<String>, StoreError> {
        signets::query_signet_handle(&self.pool, uri).await
    }

    pub async fn query_signet_channel_id(
        &self,
        uri: &str,
    ) -> Result<Option<(String, u32)>, StoreError> {
        signets::query_signet_channel_id(&self.pool, uri).await
    }

    pub async fn get_signet(&self, uri: &str) -> Result<Option<Signet>, StoreError> {
        signets::get_signet(&self.pool, uri).await
    }

    pub async fn get_last_seen(
        &self,
        handle: &str,
    ) -> Result<Option<(String, DateTime<Utc>)>, StoreError> {
        signets::get_last_seen(&self.pool, handle).await
    }

    // --- messages ---

    pub async fn store_message(&self, message: &Message) -> Result<bool, StoreError> {
        messages::store_message(&self.pool, message).await
    }

    pub async fn update_message(&self, message: &Message) -> Result<(), StoreError> {
        messages::update_message(&self.pool, message).await
    }

    pub async fn delete_message(&self, uri: &str) -> Result<(), StoreError> {
        messages::delete_message(&self.pool, uri).await
    }

    pub async fn get_messages(
        &self,
        channel_uri: &str,
        limit: Option<i64>,
        cursor: Option<u32>,
    ) -> Result<(Vec<SignedMessageView>, Option<String>), StoreError> {
        let limit = messages::clamp_limit(limit);
        messages::get_messages(&self.pool, channel_uri, limit, cursor).await
    }

    pub async fn get_msg_channel_uri(&self, signet_uri: &str) -> Result<Option<String>, StoreError> {
        messages::get_msg_channel_uri(&self.pool, signet_uri).await
    }

    // --- images ---

    pub async fn store_image(&self, image: &Image) -> Result<bool, StoreError> {
        images::store_image(&self.pool, image).await
    }

    pub async fn update_image(&self, image: &Image) -> Result<(), StoreError> {
        images::update_image(&self.pool, image).await
    }

    pub async fn delete_image(&self, uri: &str) -> Result<(), StoreError> {
        images::delete_image(&self.pool, uri).await
    }

    pub async fn get_image(&self, uri: &str) -> Result<Option<Image>, StoreError> {
        images::get_image(&self.pool, uri).await
    }

    pub async fn get_image_by_did_cid(
        &self,
        did: &str,
        blob_cid: &str,
    ) -> Result<Option<Image>, StoreError> {
        images::get_image_by_did_cid(&self.pool, did, blob_cid).await
    }

    // --- oauth ---

    pub async fn save_auth_request(&self, req: &OAuthRequestRow) -> Result<(), StoreError> {
        oauth::save_auth_request(&self.pool, req).await
    }

    pub async fn get_auth_request(
        &self,
        state: &str,
    ) -> Result<Option<OAuthRequestRow>, StoreError> {
        oauth::get_auth_request(&self.pool, state).await
    }

    pub async fn delete_auth_request(&self, state: &str) -> Result<(), StoreError> {
        oauth::delete_auth_request(&self.pool, state).await
    }

    pub async fn save_session(&self, session: &OAuthSessionRow) -> Result<(), StoreError> {
        oauth::save_session(&self.pool, session).await
    }

    pub async fn get_session(
        &self,
        did: &str,
        session_id: &str,
    ) -> Result<Option<OAuthSessionRow>, StoreError> {
        oauth::get_session(&self.pool, did, session_id).await
    }

    pub async fn delete_session(&self, did: &str, session_id: &str) -> Result<(), StoreError> {
        oauth::delete_session(&self.pool, did, session_id).await
    }

    pub async fn delete_all_sessions(&self, did: &str) -> Result<(), StoreError> {
        oauth::delete_all_sessions(&self.pool, did).await
    }

    pub async fn set_dpop_pds_nonce(&self, session_id: &str, nonce: &str) -> Result<(), StoreError> {
        oauth::set_dpop_pds_nonce(&self.pool, session_id, nonce).await
    }

    pub async fn set_dpop_authserver_nonce(
        &self,
        session_id: &str,
        nonce: &str,
    ) -> Result<(), StoreError> {
        oauth::set_dpop_authserver_nonce(&self.pool, session_id, nonce).await
    }

    pub async fn update_session_tokens(
        &self,
        session_id: &str,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        oauth::update_session_tokens(&self.pool, session_id, access_token, refresh_token, expires_at)
            .await
    }

    // --- bans ---

    pub async fn add_ban(
        &self,
        did: &str,
        reason: Option<&str>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Ban, StoreError> {
        bans::add_ban(&self.pool, did, reason, until).await
    }

    pub async fn get_banned(&self, did: &str) -> Result<Vec<Ban>, StoreError> {
        bans::get_banned(&self.pool, did).await
    }

    pub async fn get_ban(&self, id: i64) -> Result<Option<Ban>, StoreError> {
        bans::get_ban(&self.pool, id).await
    }

    pub async fn is_banned(&self, did: &str) -> Result<bool, StoreError> {
        bans::is_banned(&self.pool, did).await
    }
}
