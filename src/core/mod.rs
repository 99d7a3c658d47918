pub mod error;
pub mod types;

pub use error::{FragmentError, IdentityError, RegistryError, Result};
pub use types::{
    AttributeMap, ChangeNotification, Fragment, MACHINES_INTERFACE, MergedView, RECORDS_PROPERTY,
    UpdateRequest, merge_attributes,
};
