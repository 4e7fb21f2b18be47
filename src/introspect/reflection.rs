use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use super::{ClassIntrospection, ClassStructure, IntrospectRequest, Introspector};
use crate::decompile::run_captured;

const HELPER_CLASS: &str = "ClassRecoverIntrospector";

// Args: <classes root> <filter> <archive>. Walks the classes root for class files and
// loads them with the root and the archive on the classpath.
// Emits one tab-separated record per line:
//   CLASS <fqn> | DECL <text> | ANNOTATION <text> | FIELD <text> | METHOD <text> | ERROR <fqn> <message>
const HELPER_SOURCE: &str = r#"
import java.io.File;
import java.lang.annotation.Annotation;
import java.lang.reflect.Field;
import java.lang.reflect.Method;
import java.net.URL;
import java.net.URLClassLoader;
import java.nio.file.Files;
import java.nio.file.Path;
import java.nio.file.Paths;
import java.util.List;
import java.util.stream.Collectors;
import java.util.stream.Stream;

public class ClassRecoverIntrospector {
    private static String clean(Object o) {
        return String.valueOf(o).replace('\t', ' ').replace('\n', ' ').replace('\r', ' ');
    }

    public static void main(String[] args) throws Exception {
        Path root = Paths.get(args[0]);
        String filter = args.length > 1 ? args[1] : "";
        URL[] urls = args.length > 2
            ? new URL[] { root.toUri().toURL(), new File(args[2]).toURI().toURL() }
            : new URL[] { root.toUri().toURL() };

        List<Path> classFiles;
        try (Stream<Path> walk = Files.walk(root)) {
            classFiles = walk
                .filter(p -> Files.isRegularFile(p) && p.toString().endsWith(".class"))
                .sorted()
                .collect(Collectors.toList());
        }

        try (URLClassLoader cl = URLClassLoader.newInstance(urls)) {
            for (Path file : classFiles) {
                String relative = root.relativize(file).toString();
                if (relative.equals("module-info.class") || relative.endsWith("package-info.class")) {
                    continue;
                }
                String className = relative
                    .substring(0, relative.length() - ".class".length())
                    .replace(File.separatorChar, '.');
                if (!className.contains(filter)) {
                    continue;
                }
                try {
                    Class<?> cls = cl.loadClass(className);
                    StringBuilder out = new StringBuilder();
                    out.append("CLASS\t").append(className).append('\n');
                    out.append("DECL\t").append(clean(cls.toGenericString())).append('\n');
                    for (Annotation a : cls.getAnnotations()) {
                        out.append("ANNOTATION\t").append(clean(a)).append('\n');
                    }
                    for (Field f : cls.getDeclaredFields()) {
                        out.append("FIELD\t").append(clean(f)).append('\n');
                    }
                    for (Method m : cls.getDeclaredMethods()) {
                        out.append("METHOD\t").append(clean(m)).append('\n');
                    }
                    System.out.print(out);
                } catch (Throwable e) {
                    System.out.println("ERROR\t" + className + "\t" + clean(e));
                }
            }
        }
    }
}
"#;

/// Loads classes with Java reflection through a helper compiled on the fly.
#[derive(Debug, Clone)]
pub struct ReflectionIntrospector {
    java: PathBuf,
    javac: PathBuf,
    timeout: Option<Duration>,
}

impl ReflectionIntrospector {
    pub fn new(java: PathBuf, javac: PathBuf, timeout: Option<Duration>) -> Self {
        Self {
            java,
            javac,
            timeout,
        }
    }

    fn compile_helper(&self, scratch: &Path) -> Result<()> {
        let source = scratch.join(format!("{HELPER_CLASS}.java"));
        std::fs::write(&source, HELPER_SOURCE)
            .with_context(|| format!("Failed to write helper source: {}", source.display()))?;

        let mut cmd = Command::new(&self.javac);
        cmd.arg("-d").arg(scratch).arg(&source);
        let out = run_captured(cmd, self.timeout).with_context(|| {
            format!(
                "Failed to execute {} (ensure a JDK is installed)",
                self.javac.display()
            )
        })?;
        match out.status {
            Some(status) if status.success() => Ok(()),
            Some(status) => bail!("javac failed: {}", out.diagnostic(status)),
            None => bail!("javac timed out"),
        }
    }

    fn run_helper(&self, scratch: &Path, request: &IntrospectRequest) -> Result<String> {
        let classes_root = std::fs::canonicalize(&request.classes_root).with_context(|| {
            format!("Failed to resolve class root: {}", request.classes_root.display())
        })?;
        let archive = std::fs::canonicalize(&request.archive_path).with_context(|| {
            format!("Failed to resolve archive: {}", request.archive_path.display())
        })?;

        let mut cmd = Command::new(&self.java);
        cmd.arg("-cp")
            .arg(scratch)
            .arg(HELPER_CLASS)
            .arg(&classes_root)
            .arg(&request.filter)
            .arg(&archive);
        let out = run_captured(cmd, self.timeout).with_context(|| {
            format!(
                "Failed to execute {} (ensure JRE/JDK is installed)",
                self.java.display()
            )
        })?;
        match out.status {
            Some(status) if status.success() => Ok(String::from_utf8_lossy(&out.stdout).to_string()),
            Some(status) => bail!("introspection helper failed: {}", out.diagnostic(status)),
            None => bail!("introspection helper timed out"),
        }
    }
}

impl Introspector for ReflectionIntrospector {
    fn name(&self) -> &'static str {
        "reflection"
    }

    fn introspect(&self, request: &IntrospectRequest) -> Result<Vec<ClassIntrospection>> {
        if !request.classes_root.is_dir() {
            debug!(root = %request.classes_root.display(), "no class root to load from");
            return Ok(Vec::new());
        }

        let scratch = scratch_dir();
        std::fs::create_dir_all(&scratch)
            .with_context(|| format!("Failed to create directory: {}", scratch.display()))?;

        let result = self
            .compile_helper(&scratch)
            .and_then(|()| self.run_helper(&scratch, request));
        let _ = std::fs::remove_dir_all(&scratch);

        let records = parse_records(&result?);
        info!(classes = records.len(), "reflection introspection finished");
        Ok(records)
    }
}

fn scratch_dir() -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "class-recover-introspect-{}-{nanos}",
        std::process::id()
    ))
}

pub(crate) fn parse_records(output: &str) -> Vec<ClassIntrospection> {
    let mut results = Vec::new();
    let mut current: Option<ClassStructure> = None;

    for line in output.lines() {
        let (tag, rest) = line.split_once('\t').unwrap_or((line, ""));
        match tag {
            "CLASS" => {
                if let Some(done) = current.take() {
                    results.push(ClassIntrospection::loaded(done));
                }
                let (package, name) = rest.rsplit_once('.').unwrap_or(("", rest));
                current = Some(ClassStructure {
                    name: name.to_string(),
                    package: package.to_string(),
                    ..ClassStructure::default()
                });
            }
            "ERROR" => {
                if let Some(done) = current.take() {
                    results.push(ClassIntrospection::loaded(done));
                }
                let (class_name, message) = rest.split_once('\t').unwrap_or((rest, ""));
                results.push(ClassIntrospection::failed(class_name, message));
            }
            "DECL" | "ANNOTATION" | "FIELD" | "METHOD" => {
                let Some(structure) = current.as_mut() else {
                    debug!(line, "record outside of a class");
                    continue;
                };
                let value = rest.to_string();
                match tag {
                    "DECL" => structure.class_declaration = value,
                    "ANNOTATION" => structure.annotations.push(value),
                    "FIELD" => structure.fields.push(value),
                    _ => structure.methods.push(value),
                }
            }
            _ if line.trim().is_empty() => {}
            _ => debug!(line, "ignoring unexpected helper output"),
        }
    }

    if let Some(done) = current.take() {
        results.push(ClassIntrospection::loaded(done));
    }
    results
}
