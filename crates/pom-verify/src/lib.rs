//! Ownership verification for Persistence of Memory
//!
//! A user proves control of a social profile by posting a one-time code
//! there. The engine issues codes and checks recent posts for them, one poll
//! per call, through whichever [`SocialPlatform`] is configured for the
//! profile's platform.

pub mod code;
pub mod engine;
pub mod http_feed;
pub mod platform;

pub use code::CodeGenerator;
pub use engine::VerificationEngine;
pub use http_feed::HttpFeedPlatform;
pub use platform::{PlatformDirectory, SocialPlatform, StaticPlatform};
