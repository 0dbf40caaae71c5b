//! # Pushbridge Core
//!
//! In-memory delivery engine for the pushbridge server.
//!
//! ## Components
//!
//! - [`ConnectionRegistry`] - One live channel per identity, send-by-identity
//! - [`MessageRouter`] - `@mention` redirection to public accounts
//! - [`CorrelationTable`] - Pending reply sinks keyed by correlation id
//! - [`RequestResponseStream`] - Send once, then stream correlated replies
//! - [`BatchProcessor`] - Independent fan-out of many messages
//! - [`Bridge`] - Facade owning one instance of each of the above
//!
//! ## Data Flow
//!
//! ```text
//! inbound Message ──► MessageRouter ──► ConnectionRegistry ──► Channel
//!                                                 │
//!                     caller ◄── ReplyStream ◄── CorrelationTable ◄── replies
//! ```
//!
//! Nothing is persisted. Connections and pending correlations live for the
//! lifetime of the process.

pub mod batch;
pub mod bridge;
pub mod channel;
pub mod correlation;
pub mod error;
pub mod message;
pub mod registry;
pub mod router;
pub mod stream;

#[cfg(test)]
pub(crate) mod test_support;

pub use batch::{BatchItemResult, BatchProcessor};
pub use bridge::{Bridge, BridgeConfig};
pub use channel::{Channel, ConnectionObserver};
pub use correlation::{CorrelationTable, ReplyStream};
pub use error::{ChannelError, CorrelationError, RegistryError, StreamError};
pub use message::{Message, Payload, CORRELATION_ID_FIELD};
pub use registry::{Connection, ConnectionRegistry, SendOutcome};
pub use router::{mentions, MessageRouter, PublicAccountSet, DEFAULT_MENTION_FIELDS};
pub use stream::RequestResponseStream;
