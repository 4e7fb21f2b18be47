//! Class introspection behind a pluggable [`Introspector`].
//!
//! Two implementations ship with the crate:
//!
//! - [`SourceIntrospector`] reads the decompiled `.java` files with tree-sitter
//!   and needs nothing but the decompiler's output.
//! - [`ReflectionIntrospector`] compiles a small Java helper and loads each
//!   class through a `URLClassLoader`, which requires a JDK on the machine.
//!
//! Both report one [`ClassIntrospection`] per matching class, including the
//! classes that could not be inspected.

mod reflection;
mod source;

pub use reflection::ReflectionIntrospector;
pub use source::{SourceIntrospector, parse_class_structure};

use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::scan::class_name_from_path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassStructure {
    pub name: String,
    pub package: String,
    pub imports: Vec<String>,
    pub annotations: Vec<String>,
    pub class_declaration: String,
    pub fields: Vec<String>,
    pub methods: Vec<String>,
}

impl ClassStructure {
    pub fn qualified_name(&self) -> String {
        if self.package.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.package, self.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Inspection {
    Loaded(ClassStructure),
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassIntrospection {
    pub class_name: String,
    #[serde(flatten)]
    pub inspection: Inspection,
}

impl ClassIntrospection {
    pub fn loaded(structure: ClassStructure) -> Self {
        Self {
            class_name: structure.qualified_name(),
            inspection: Inspection::Loaded(structure),
        }
    }

    pub fn failed(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            inspection: Inspection::Failed {
                message: message.into(),
            },
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.inspection, Inspection::Loaded(_))
    }
}

/// A `.java` file this run's decompiler is expected to have written.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DecompiledSource {
    /// Fully-qualified name of the top-level class.
    pub class_name: String,
    pub path: PathBuf,
}

impl DecompiledSource {
    /// CFR writes `<output_dir>/<package dirs>/<Outer>.java`; nested classes
    /// (`Outer$Inner.class`) share their outer class's file.
    pub fn for_class(classes_root: &Path, class_file: &Path, output_dir: &Path) -> Option<Self> {
        let relative = class_file.strip_prefix(classes_root).ok()?;
        let stem = relative.file_stem()?.to_str()?;
        let outer = stem.split('$').next().filter(|s| !s.is_empty())?;
        let relative = relative.with_file_name(format!("{outer}.java"));
        Some(Self {
            class_name: class_name_from_path(Path::new(""), &relative)?,
            path: output_dir.join(relative),
        })
    }
}

#[derive(Debug, Clone)]
pub struct IntrospectRequest {
    pub archive_path: PathBuf,
    /// Directory the class files were enumerated from.
    pub classes_root: PathBuf,
    /// Sources produced by this run's successful decompilations.
    pub sources: Vec<DecompiledSource>,
    /// Substring a fully-qualified class name must contain to be inspected.
    pub filter: String,
}

impl IntrospectRequest {
    pub fn matches(&self, class_name: &str) -> bool {
        class_name.contains(&self.filter)
    }
}

pub trait Introspector: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Inspects every class selected by `request`.
    ///
    /// An `Err` means the introspector itself could not run; per-class problems
    /// come back as [`Inspection::Failed`] entries.
    fn introspect(&self, request: &IntrospectRequest) -> Result<Vec<ClassIntrospection>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_name_handles_default_package() {
        let mut s = ClassStructure {
            name: "Demo".to_string(),
            ..ClassStructure::default()
        };
        assert_eq!(s.qualified_name(), "Demo");
        s.package = "com.example".to_string();
        assert_eq!(s.qualified_name(), "com.example.Demo");
    }

    #[test]
    fn decompiled_source_follows_package_dirs() {
        let root = Path::new("/x/extracted/BOOT-INF/classes");
        let source = DecompiledSource::for_class(
            root,
            &root.join("com/example/Outer$Inner.class"),
            Path::new("/x/decompiled"),
        )
        .unwrap();
        assert_eq!(source.class_name, "com.example.Outer");
        assert_eq!(source.path, PathBuf::from("/x/decompiled/com/example/Outer.java"));

        assert!(
            DecompiledSource::for_class(root, Path::new("/elsewhere/A.class"), Path::new("/x"))
                .is_none()
        );
    }

    #[test]
    fn failed_entries_serialize_with_status() {
        let entry = ClassIntrospection::failed("com.example.BrokenController", "NoClassDefFoundError");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["class_name"], "com.example.BrokenController");
        assert_eq!(json["message"], "NoClassDefFoundError");
    }
}
