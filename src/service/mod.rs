pub mod login_messages;
pub mod registry;
pub mod user;

pub use login_messages::{LoginMessages, NO_MESSAGES};
pub use registry::RegistryService;
pub use user::{UserSnapshot, ordered_groups};
