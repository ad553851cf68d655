//! Data models for conference content and feature flags.
//!
//! - `ContentSnapshot`: the versioned bundle delivered by the content feed
//! - `Session`, `Speaker`: schedule entities referencing each other by id
//! - `Track`, `Room`, `Day`, `Sponsor`: flat reference entities
//! - `FeatureFlagSet`: remote switches delivered by the flags feed
//!
//! All documents decode through [`decode_document`], which matches field
//! names regardless of case.

pub mod decode;
pub mod flags;
pub mod session;
pub mod snapshot;
pub mod speaker;
pub mod venue;

pub use decode::decode_document;
pub use flags::{FeatureFlagSet, SESSION_FEEDBACK_ENABLED};
pub use session::Session;
pub use snapshot::{ApiEndpoints, ConferenceInfo, ContentSnapshot};
pub use speaker::{Speaker, SpeakerSocials};
pub use venue::{Day, MapCoordinates, Room, Sponsor, Track};
