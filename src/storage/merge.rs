use crate::core::{Fragment, FragmentError, MergedView};
use crate::storage::fragment::{list_fragments, read_fragment};
use std::path::Path;
use tracing::{debug, error, warn};

/// Builds the merged view of every fragment in `directory`.
///
/// Fragments are applied in file-name order; for a record defined in
/// several fragments the attribute maps are merged key by key and the
/// fragment sorting last wins a conflicting key. Broken fragments are
/// skipped so one bad file never hides the others.
pub fn build_view(directory: &Path) -> MergedView {
    let mut view = MergedView::new();

    let fragments = match list_fragments(directory) {
        Ok(fragments) => fragments,
        Err(err) => {
            error!(
                directory = %directory.display(),
                error = %err,
                "Unable to list fragments. Ignoring."
            );
            return view;
        }
    };

    for path in fragments {
        match read_fragment(&path) {
            Ok(fragment) => merge_fragment(&mut view, fragment),
            Err(FragmentError::Parse { source, .. }) => {
                warn!(
                    file = %path.display(),
                    error = %source,
                    "Invalid JSON in fragment. Ignoring."
                );
            }
            Err(FragmentError::NotFound(_)) => {
                debug!(file = %path.display(), "Fragment vanished while merging");
            }
            Err(err @ FragmentError::Io { .. }) => {
                error!(file = %path.display(), error = %err, "Unreadable fragment. Ignoring.");
            }
        }
    }

    view
}

/// Folds one parsed fragment into `view` with per-key overwrite.
pub fn merge_fragment(view: &mut MergedView, fragment: Fragment) {
    for (record, attributes) in fragment {
        view.entry(record).or_default().extend(attributes);
    }
}
