use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const CLASS_EXTENSION: &str = "class";

/// Lazily walks `root` and yields every regular `.class` file below it.
///
/// Each call performs a fresh walk. Order follows the directory walk and is not
/// stable across platforms.
pub fn class_files(root: &Path) -> impl Iterator<Item = PathBuf> {
    WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(false)
        .follow_links(false)
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "skipping unreadable path");
                None
            }
        })
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(ignore::DirEntry::into_path)
        .filter(|path| is_class_file(path))
}

pub fn is_class_file(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == CLASS_EXTENSION)
}

/// `root/com/example/Foo.class` -> `com.example.Foo`. Works for `.java` paths too.
pub fn class_name_from_path(root: &Path, class_file: &Path) -> Option<String> {
    let relative = class_file.strip_prefix(root).ok()?;
    let without_ext = relative.with_extension("");
    let parts: Vec<String> = without_ext
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("."))
}

/// Resolves the directory the enumerator should start from.
pub fn enumeration_root(extract_dir: &Path, classes_subdir: Option<&Path>) -> PathBuf {
    match classes_subdir {
        Some(sub) => extract_dir.join(sub),
        None => extract_dir.to_path_buf(),
    }
}
