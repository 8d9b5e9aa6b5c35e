//! Flag source implementations shipped with the core
//!
//! - [`ManualFlagSource`]: In-process, scriptable source

pub mod manual;

pub use manual::{ManualFlagSource, ManualFlagSourceFactory};
