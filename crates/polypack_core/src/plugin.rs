pub use bundle_emitter_plugin::*;
pub use content_handler_plugin::*;

mod bundle_emitter_plugin;
mod content_handler_plugin;
