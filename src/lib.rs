//! Transport core of a crosspoint control-signal mesh.
//!
//! Processes discover each other with UDP advertisements
//! ([`advertisement`]), exchange signal messages framed on byte streams
//! ([`envelope`], [`framing`]) and keep the latest value of each signal in a
//! deduplicating cache ([`signal`]).  [`registry`] ties discovery to the
//! endpoint registries of each system id.

pub mod advertisement;
pub mod config;
pub mod envelope;
pub mod error;
pub mod framing;
pub mod registry;
pub mod signal;
pub mod types;

pub use error::{Error, Result};
