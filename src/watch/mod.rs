pub mod debouncer;
pub mod watcher;

pub use debouncer::{DebounceState, Debouncer, sleep_until_deadline};
pub use watcher::{DirectoryWatcher, EntryChange, RawEvent, classify_event};
