//! # Contracts
//!
//! Frozen interface contracts (ICD) shared by every crate of the framer:
//! decoder configuration, packet/frame records, the event stream, the service
//! blueprint and the sink trait. Business crates depend on this crate only,
//! reverse dependencies are prohibited.
//!
//! ## Byte Model
//! - A packet is exactly `packet_size` raw bytes: `[header:2][seq:1][reserved:1][payload]`
//! - A frame is `frame_size` packets with sequences `0..frame_size-1`
//! - Frame `index` is session-local, used for ordering/diagnostics only

mod blueprint;
mod config;
mod error;
mod event;
mod packet;
mod session_id;
mod sink;

pub use blueprint::*;
pub use config::*;
pub use error::*;
pub use event::*;
pub use packet::*;
pub use session_id::SessionId;
pub use sink::*;
