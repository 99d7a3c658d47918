//! Fragment file I/O.
//!
//! A fragment is a JSON object of objects living directly inside the
//! registry directory. Reads are plain snapshots; writes go through a hidden
//! temporary sibling that is renamed over the target, so concurrent readers
//! only ever observe the old or the new content.

use crate::core::{Fragment, FragmentError};
use std::fs::{self, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::warn;

/// File extension a directory entry needs to be considered a fragment.
pub const FRAGMENT_EXTENSION: &str = "json";

/// Mode given to fragments that did not exist before the write.
const NEW_FRAGMENT_MODE: u32 = 0o644;

/// Reads and parses one fragment.
pub fn read_fragment(path: &Path) -> Result<Fragment, FragmentError> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(FragmentError::NotFound(path.to_path_buf()));
        }
        Err(e) => return Err(FragmentError::io(path, e)),
    };

    serde_json::from_slice(&data).map_err(|source| FragmentError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Serializes `contents` with two-space indentation and atomically replaces `path`.
///
/// The parent directory must exist. Permission bits of an existing target
/// carry over to the new file.
pub fn write_fragment(path: &Path, contents: &Fragment) -> Result<(), FragmentError> {
    let serialized =
        serde_json::to_vec_pretty(contents).map_err(|e| FragmentError::io(path, e.into()))?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| FragmentError::io(path, io::Error::from(io::ErrorKind::InvalidInput)))?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let permissions = match fs::metadata(path) {
        Ok(meta) => meta.permissions(),
        Err(_) => Permissions::from_mode(NEW_FRAGMENT_MODE),
    };

    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(directory)
        .map_err(|e| FragmentError::io(path, e))?;
    temp.write_all(&serialized)
        .map_err(|e| FragmentError::io(path, e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| FragmentError::io(path, e))?;
    temp.as_file()
        .set_permissions(permissions)
        .map_err(|e| FragmentError::io(path, e))?;
    temp.persist(path)
        .map_err(|e| FragmentError::io(path, e.error))?;

    Ok(())
}

/// Lists fragment files of `directory`, sorted by file name.
///
/// Hidden entries, subdirectories and names without the `.json` extension
/// are skipped, as are entries that cannot be read. A missing directory
/// lists as empty.
pub fn list_fragments(directory: &Path) -> Result<Vec<PathBuf>, FragmentError> {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(FragmentError::io(directory, e)),
    };

    Ok(select_fragments(
        directory,
        entries.map(|entry| entry.map(|entry| entry.path())),
    ))
}

fn select_fragments(
    directory: &Path,
    entries: impl IntoIterator<Item = io::Result<PathBuf>>,
) -> Vec<PathBuf> {
    let mut fragments = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(err) => {
                warn!(directory = %directory.display(), error = %err, "Skipping unreadable entry");
                continue;
            }
        };
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !is_fragment_name(name) || path.is_dir() {
            continue;
        }
        fragments.push(path);
    }

    fragments.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    fragments
}

/// True for names the merge picks up: visible and ending in `.json`.
pub fn is_fragment_name(name: &str) -> bool {
    !name.starts_with('.')
        && Path::new(name)
            .extension()
            .is_some_and(|ext| ext == FRAGMENT_EXTENSION)
}

/// True when `name` addresses a visible file directly inside the registry
/// directory (no separators, no `.`/`..`, no leading dot).
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && !name.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn fragment(value: serde_json::Value) -> Fragment {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_read_missing_fragment() {
        let temp_dir = TempDir::new().unwrap();
        let err = read_fragment(&temp_dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, FragmentError::NotFound(_)));
    }

    #[test]
    fn test_read_invalid_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.json");
        fs::write(&path, "{\"host1\": ").unwrap();
        assert!(matches!(
            read_fragment(&path).unwrap_err(),
            FragmentError::Parse { .. }
        ));
    }

    #[test]
    fn test_read_rejects_wrong_shape() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("list.json");
        fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(matches!(
            read_fragment(&path).unwrap_err(),
            FragmentError::Parse { .. }
        ));

        fs::write(&path, "{\"host1\": 5}").unwrap();
        assert!(matches!(
            read_fragment(&path).unwrap_err(),
            FragmentError::Parse { .. }
        ));
    }

    #[test]
    fn test_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("hosts.json");
        let contents = fragment(json!({"host1": {"address": "10.1.1.1", "port": 22}}));

        write_fragment(&path, &contents).unwrap();

        assert_eq!(read_fragment(&path).unwrap(), contents);
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"host1\": {\n    \"address\""));
    }

    #[test]
    fn test_write_leaves_no_temporary_files() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("hosts.json");
        write_fragment(&path, &fragment(json!({"a": {}}))).unwrap();
        write_fragment(&path, &fragment(json!({"b": {}}))).unwrap();

        let names: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("hosts.json")]);
    }

    #[test]
    fn test_write_preserves_permissions() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("private.json");
        fs::write(&path, "{}").unwrap();
        fs::set_permissions(&path, Permissions::from_mode(0o600)).unwrap();

        write_fragment(&path, &fragment(json!({"h": {"x": 1}}))).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_new_fragment_is_world_readable() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("new.json");
        write_fragment(&path, &Fragment::new()).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, NEW_FRAGMENT_MODE);
    }

    #[test]
    fn test_list_sorted_and_filtered() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["b.json", "a.json", ".hidden.json", "notes.txt", "c.json.tmp"] {
            fs::write(temp_dir.path().join(name), "{}").unwrap();
        }
        fs::create_dir(temp_dir.path().join("dir.json")).unwrap();

        let names: Vec<_> = list_fragments(temp_dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[test]
    fn test_unreadable_entry_does_not_hide_the_rest() {
        let temp_dir = TempDir::new().unwrap();
        let entries = vec![
            Ok(temp_dir.path().join("b.json")),
            Err(io::Error::from_raw_os_error(5)),
            Ok(temp_dir.path().join("a.json")),
        ];

        let names: Vec<_> = select_fragments(temp_dir.path(), entries)
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[test]
    fn test_list_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        assert!(list_fragments(&temp_dir.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_plain_file_names() {
        assert!(is_plain_file_name("99-webui.json"));
        assert!(is_plain_file_name("hosts"));
        assert!(!is_plain_file_name(""));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name(".hidden.json"));
        assert!(!is_plain_file_name("../escape.json"));
        assert!(!is_plain_file_name("sub/dir.json"));
    }
}
