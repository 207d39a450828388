//! Wire Protocol
//!
//! Frame types and the type-tag codec for the feed protocol. The
//! protocol is consumed, not owned: unknown frame types must decode to
//! a first-class `Unknown` outcome so a newer server never breaks this
//! client.

/// Frame and payload types.
pub mod messages;

/// JSON codec with tag-based dispatch.
pub mod codec;

pub use codec::{CodecError, FeedCodec};
pub use messages::{FeedMessage, SubscriptionRequest};
