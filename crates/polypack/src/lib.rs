//! polypack build orchestration
//!
//! Drives the resolver chain and a pool of isolated workers to a fixed
//! point over the dependency graph, then hands each completed variant to
//! the bundle generator and the configured emitter.

pub mod build;
pub mod options;
pub mod polypack;
pub mod resolver_chain;
pub mod worker;

pub use build::BuildResult;
pub use options::PolypackOptions;
pub use polypack::Polypack;
pub use resolver_chain::ResolverChain;
pub use resolver_chain::SpecifierResolver;
