//! Wire codec for the fastsync block-synchronization pool.
//!
//! Translates between in-memory [`SyncMessage`](fastsync_messages::SyncMessage)
//! variants and their compressed wire form. The transport that moves the
//! resulting bytes is out of scope; the pool crate's `Reactor` trait is
//! the only surface it implements.

pub mod codec;

pub use codec::{decode_message, encode_message, CodecError};
