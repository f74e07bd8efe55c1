//! Build-time generator of go-kit service scaffolds from Go interfaces and
//! an options DSL written next to them.

pub mod error;
pub mod finder;
pub mod frame;
pub mod importer;
pub mod loader;
pub mod model;
pub mod normalize;
pub mod option;
pub mod plugin;
pub mod swipe;
pub mod writer;

#[cfg(test)]
mod testutil;

pub use error::SwipeError;
pub use swipe::{Config, GenerateResult, Output, Swipe};
