use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::decompile::DecompileOutcome;
use crate::dispatch::{DispatchSummary, FileReport, Reporter};
use crate::extract::ExtractSummary;
use crate::introspect::{ClassIntrospection, Inspection};

#[derive(Debug, Clone, Serialize)]
pub struct IntrospectionReport {
    pub introspector: &'static str,
    pub filter: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub classes: Vec<ClassIntrospection>,
}

impl IntrospectionReport {
    pub fn failed_classes(&self) -> usize {
        self.classes.iter().filter(|c| !c.is_loaded()).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub archive: PathBuf,
    pub archive_sha256: String,
    pub extraction: ExtractSummary,
    pub classes_root: PathBuf,
    pub decompile_dir: PathBuf,
    pub decompiler: &'static str,
    pub dispatch: DispatchSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introspection: Option<IntrospectionReport>,
    pub duration_ms: u64,
}

pub fn hash_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to hash {}", path.display()))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Prints one progress line per file to stdout as the batch runs.
#[derive(Debug, Default)]
pub struct TextReporter;

impl Reporter for TextReporter {
    fn extracted(&mut self, summary: &ExtractSummary) {
        println!("Extracted JAR to {}", summary.root.display());
        if summary.skipped > 0 {
            println!("Skipped {} entries outside the extraction root", summary.skipped);
        }
        println!("\nDecompiling .class files to .java source...");
    }

    fn dispatched(&mut self, class_file: &Path) {
        println!("Decompiling {}...", class_file.display());
    }

    fn finished(&mut self, report: &FileReport) {
        println!("{}", render_file_report(report));
    }
}

/// Keeps every file report for the final JSON document.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    pub files: Vec<FileReport>,
}

impl Reporter for CollectingReporter {
    fn finished(&mut self, report: &FileReport) {
        self.files.push(report.clone());
    }
}

pub fn render_file_report(report: &FileReport) -> String {
    let path = report.class_file.display();
    match &report.outcome {
        DecompileOutcome::Succeeded => {
            format!("Decompiled {path} to {}", report.output_dir.display())
        }
        DecompileOutcome::Failed { diagnostic, .. } => {
            format!("Failed to decompile {path}: {diagnostic}")
        }
        DecompileOutcome::ToolInvocationError { reason } => {
            format!("Could not run decompiler for {path}: {reason}")
        }
    }
}

pub fn render_introspection(report: &IntrospectionReport) -> String {
    let mut out = String::new();
    if let Some(error) = &report.error {
        out.push_str(&format!("Introspection ({}) failed: {error}\n", report.introspector));
        return out;
    }

    out.push_str(&format!(
        "Classes matching \"{}\" via {}: {} found, {} not inspected\n\n",
        report.filter,
        report.introspector,
        report.classes.len(),
        report.failed_classes()
    ));
    for class in &report.classes {
        match &class.inspection {
            Inspection::Loaded(s) => {
                out.push_str(&format!("Class: {}\n", class.class_name));
                for (title, items) in [
                    ("Annotations", &s.annotations),
                    ("Fields", &s.fields),
                    ("Methods", &s.methods),
                ] {
                    out.push_str(&format!("{title}:\n"));
                    for item in items {
                        out.push_str(&format!("  {item}\n"));
                    }
                }
                out.push('\n');
            }
            Inspection::Failed { message } => {
                out.push_str(&format!("Class: {} (not inspected: {message})\n\n", class.class_name));
            }
        }
    }
    out
}

pub fn render_summary(report: &RunReport) -> String {
    let d = &report.dispatch;
    let mut out = format!(
        "\n{} of {} class files decompiled to {}",
        d.succeeded,
        d.attempted,
        report.decompile_dir.display()
    );
    if d.unsuccessful() > 0 {
        out.push_str(&format!(
            "\n{} files failed to decompile ({} could not start the decompiler)",
            d.unsuccessful(),
            d.tool_errors
        ));
    }
    out.push_str(&format!("\nFinished in {} ms", report.duration_ms));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::ClassStructure;

    fn report(outcome: DecompileOutcome) -> FileReport {
        FileReport {
            class_file: PathBuf::from("out/com/x/A.class"),
            output_dir: PathBuf::from("decompiled_sources"),
            outcome,
            duration_ms: 3,
        }
    }

    #[test]
    fn file_report_lines_name_the_path_and_cause() {
        assert_eq!(
            render_file_report(&report(DecompileOutcome::Succeeded)),
            "Decompiled out/com/x/A.class to decompiled_sources"
        );
        let failed = render_file_report(&report(DecompileOutcome::Failed {
            diagnostic: "bad magic".to_string(),
            timed_out: false,
        }));
        assert_eq!(failed, "Failed to decompile out/com/x/A.class: bad magic");
    }

    #[test]
    fn file_report_serializes_flat_status() {
        let json = serde_json::to_value(report(DecompileOutcome::ToolInvocationError {
            reason: "no such file".to_string(),
        }))
        .unwrap();
        assert_eq!(json["status"], "tool_invocation_error");
        assert_eq!(json["reason"], "no such file");
        assert_eq!(json["class_file"], "out/com/x/A.class");
    }

    #[test]
    fn introspection_rendering_lists_members() {
        let report = IntrospectionReport {
            introspector: "source",
            filter: "Controller".to_string(),
            error: None,
            classes: vec![
                ClassIntrospection::loaded(ClassStructure {
                    name: "DemoController".to_string(),
                    package: "com.example".to_string(),
                    methods: vec!["public String hello()".to_string()],
                    ..ClassStructure::default()
                }),
                ClassIntrospection::failed("com.example.Broken", "boom"),
            ],
        };
        let text = render_introspection(&report);
        assert!(text.contains("Class: com.example.DemoController"));
        assert!(text.contains("  public String hello()"));
        assert!(text.contains("com.example.Broken (not inspected: boom)"));
        assert!(text.contains("2 found, 1 not inspected"));
    }

    #[test]
    fn hash_file_is_hex_sha256() -> Result<()> {
        let path = std::env::temp_dir().join(format!(
            "class_recover_hash_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::write(&path, b"abc")?;
        assert_eq!(
            hash_file(&path)?,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        std::fs::remove_file(path)?;
        Ok(())
    }
}
