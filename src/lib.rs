// ============================================================================
// machinesd library
// ============================================================================
//
// A directory-backed registry of machine records. Every `*.json` file in the
// registry directory contributes records; the service merges them into one
// view, offers a read-modify-write `update` against a single file, and
// signals observers (debounced) whenever the directory changes.

pub mod config;
pub mod core;
pub mod service;
pub mod storage;
pub mod watch;
pub mod web;

// Re-export main types for convenience
pub use config::{RegistryConfig, ServerConfig};
pub use core::{
    AttributeMap, ChangeNotification, Fragment, FragmentError, MergedView, RegistryError, Result,
    UpdateRequest,
};
pub use service::{LoginMessages, RegistryService, UserSnapshot};
pub use web::{AppState, build_router};
