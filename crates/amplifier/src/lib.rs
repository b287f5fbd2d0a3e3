//! # Amplifier
//!
//! Client side of the amplifier's binary command/response protocol.
//!
//! Responsibilities:
//! - Fixed-layout packet encoding (`codec`)
//! - TCP session: handshake, clock synchronization, trigger and record commands (`link`)
//! - A simulated amplifier peer for tests without hardware (`mock`)
//!
//! ## Usage Example
//!
//! ```ignore
//! use amplifier::AmplifierLink;
//!
//! let mut link = AmplifierLink::connect(&config.amplifier).await?;
//! let report = link.synch().await?;
//! println!("time difference between amplifier and local clock: {} ms", report.diff_ms());
//! link.trigger(7, std::time::Instant::now()).await?;
//! link.close().await?;
//! ```

pub mod codec;
mod error;
mod link;
pub mod mock;

pub use codec::{tag_code, Response, SyncPacket, TriggerPacket};
pub use error::{describe_byte, AmplifierError, CodecError, ProtocolError};
pub use link::{AmplifierLink, LinkSettings, SyncReport};
pub use mock::{MockAmplifier, MockAmplifierConfig};
