pub mod diagnostic;
pub mod graph;
pub mod hash;
pub mod plugin;
pub mod types;

// Re-export this from core so downstream crates don't need a direct dependency
pub use polypack_filesystem::FileSystem;
pub use polypack_filesystem::FileSystemRef;
