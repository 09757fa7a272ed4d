//! # stream-core
//!
//! Pure logic for FlashStream (no I/O, instant tests).
//!
//! This crate implements the state machines and algorithms behind a
//! transfer without any network, disk, or clock access, enabling fast unit
//! tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. The actual I/O (channels, chunk store, timers) is
//! performed by `stream-peer`, which interprets the actions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod link;
pub mod throughput;
pub mod tiling;
pub mod transfer;

pub use link::{LinkAction, LinkEvent, LinkPolicy, LinkState, LinkStatus};
pub use throughput::{percent, ThroughputMeter};
pub use tiling::{verify_tiling, TilingError};
pub use transfer::{
    display_name, CompletedFile, Progress, ReceiveAction, ReceiveEvent, ReceiveSession,
    ReceiveState, SendAction, SendEvent, SendState, TransferPolicy, TransferStatus,
    DEFAULT_CHUNK_SIZE,
};
