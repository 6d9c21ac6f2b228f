//! # Frame Engine
//!
//! LiDAR 字节流分帧与校验引擎。
//!
//! 负责：
//! - 在任意切分的字节流中通过包头重新同步定位包边界
//! - 校验包结构 (长度 / 包头 / 序号 / 保留字节)
//! - 按序号把包组装成帧
//! - 把所有异常分类为事件输出
//!
//! The engine does no I/O and never blocks; transports feed it bytes and
//! forward the returned events.
//!
//! ## 使用示例
//!
//! ```
//! use contracts::{DecoderPreset, StreamEvent};
//! use frame_engine::StreamDecoder;
//!
//! let mut decoder = StreamDecoder::new(DecoderPreset::Compact.config()).unwrap();
//!
//! let mut stream = Vec::new();
//! for seq in 0..8u8 {
//!     stream.extend_from_slice(&[0x0A, 0x00, seq, 0x00]);
//!     stream.extend_from_slice(&[0u8; 40]);
//! }
//!
//! // Push bytes as they arrive
//! let events = decoder.on_bytes(&stream);
//! assert!(matches!(&events[0], StreamEvent::FrameComplete { frame } if frame.len() == 8));
//!
//! let tail = decoder.on_end_of_stream();
//! assert!(matches!(tail[0], StreamEvent::SessionEnded { unconsumed_bytes: 0 }));
//! ```

mod assembler;
mod cursor;
mod decoder;
mod error;
mod length_prefix;
mod loss;
mod validator;

pub use assembler::FrameAssembler;
pub use cursor::{ByteCursor, Scan};
pub use decoder::StreamDecoder;
pub use error::EngineError;
pub use length_prefix::{Record, RecordReader};
pub use loss::{LossEstimator, LossStats, DEFAULT_MAX_PLAUSIBLE_GAP};
pub use validator::{inspect, validate};

// Re-export contracts types
pub use contracts::{DecoderConfig, DecoderPreset, Frame, Packet, RejectionReason, StreamEvent};
