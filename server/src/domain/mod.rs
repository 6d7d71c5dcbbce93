//! Lexicon domain types
//!
//! Record bodies as they live in user repositories, the view objects the
//! backend serves and streams, and `at://` uri handling.

pub mod records;
pub mod uri;
pub mod views;

pub use records::{
    AspectRatio, BlobRef, ChannelRecord, ImageEmbed, MediaEmbed, MediaRecord, MessageRecord,
    ProfileRecord, SignetRecord,
};
pub use uri::AtUri;
pub use views::{
    ChannelView, ImageView, LexStreamEvent, MediaView, MessageView, ProfileView,
    SignedMessageView, SignetView,
};
