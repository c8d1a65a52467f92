//! Async client for Sesame BLE smart locks.
//!
//! Drives a [`GattLink`] implementation (the external BLE stack) through
//! the full protocol: connection, login handshake, secure session, and the
//! command surface (lock, unlock, history, settings). One spawned transport
//! task owns the link, the session and all correlation state; the cloneable
//! [`SesameClient`] handle talks to it over channels.
//!
//! ```no_run
//! # use sesame_client::SesameClient;
//! # use sesame_core::link::GattLink;
//! # async fn example<L: GattLink>(link: L, secret: [u8; 16]) -> Result<(), sesame_client::Error> {
//! let client = SesameClient::new(link, secret);
//! client.connect().await?;
//! client.unlock("front door app").await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`GattLink`]: sesame_core::link::GattLink

mod client;
mod error;
mod transport;

pub use client::{SesameClient, Subscription};
pub use error::Error;

pub use sesame_core::config::ClientConfig;
pub use sesame_proto::event::{Event, EventMeta, HistoryEntry, MechSettings, MechStatus};
pub use sesame_proto::item_code::ItemCode;
