//! Core traits for the reachability system
//!
//! This module defines the abstract interfaces that platform integrations
//! must follow.
//!
//! - [`FlagSource`]: Read and watch low-level reachability flags

pub mod flag_source;

pub use flag_source::{FlagCallback, FlagSource, FlagSourceFactory, SubscriptionHandle};
