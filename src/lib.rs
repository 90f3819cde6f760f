//! # docvault
//!
//! Umbrella crate re-exporting [`docvault_core`].

pub use docvault_core::*;
