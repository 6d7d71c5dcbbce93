//! API route handlers

pub mod actor;
pub mod feed;
pub mod lrc;
pub mod metadata;
pub mod oauth;
pub mod xcvr;
