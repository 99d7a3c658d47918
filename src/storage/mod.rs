pub mod fragment;
pub mod merge;

pub use fragment::{
    FRAGMENT_EXTENSION, is_fragment_name, is_plain_file_name, list_fragments, read_fragment,
    write_fragment,
};
pub use merge::{build_view, merge_fragment};
