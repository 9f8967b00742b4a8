//! Bundle generation
//!
//! Consumes one completed graph variant, a working set and the bundle
//! configuration, and partitions the reachable modules into static,
//! dynamic and common bundles. Later phases assume earlier exclusions
//! already happened, so the four phases run in a fixed order.

pub use generator::generate_bundles;
pub use types::DynamicBundleKey;
pub use types::GeneratedBundleData;
pub use types::GeneratedBundles;

mod generator;
mod types;
