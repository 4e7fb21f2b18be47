use anyhow::Result;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::{PipelineConfig, install_cfr_if_missing};
use crate::dispatch::{Dispatcher, FileReport, Reporter, millis};
use crate::error::Error;
use crate::extract::{ExtractSummary, extract_archive};
use crate::introspect::{DecompiledSource, IntrospectRequest};
use crate::report::{IntrospectionReport, RunReport, hash_file};
use crate::scan::{class_files, enumeration_root};

/// Extracts the archive, decompiles every class file and runs optional introspection.
///
/// Extraction failures end the run with a typed [`Error`]. Per-file decompile
/// failures and introspection problems are recorded in the returned report;
/// use [`check`] to turn them into an exit status.
pub fn run<R: Reporter>(config: &PipelineConfig, reporter: &mut R) -> Result<RunReport> {
    let start = Instant::now();

    let extraction = extract_archive(&config.archive_path, &config.extract_dir)?;
    reporter.extracted(&extraction);
    let archive_sha256 = hash_file(&config.archive_path)?;

    let classes_root = enumeration_root(&config.extract_dir, config.classes_subdir.as_deref());
    if !classes_root.is_dir() {
        warn!(root = %classes_root.display(), "class root does not exist, nothing to decompile");
    }

    let mut files = class_files(&classes_root).peekable();
    if config.fetch_decompiler && files.peek().is_some() {
        let target = config.decompiler.path();
        if let Err(e) = install_cfr_if_missing(target) {
            warn!(target = %target.display(), error = %format!("{e:#}"), "could not install CFR");
        }
    }

    let dispatcher = Dispatcher::new(
        config.decompiler.clone(),
        classes_root.clone(),
        config.decompile_dir.clone(),
    )
    .layout(config.layout)
    .timeout(config.timeout)
    .jobs(config.jobs);
    let mut tracking = SourceTracking {
        inner: reporter,
        classes_root: &classes_root,
        sources: BTreeSet::new(),
    };
    let dispatch = dispatcher.run(files, &mut tracking);
    let sources = tracking.sources;
    info!(
        attempted = dispatch.attempted,
        succeeded = dispatch.succeeded,
        failed = dispatch.unsuccessful(),
        "decompilation finished"
    );

    let introspection = config.introspection.as_ref().map(|cfg| {
        let request = IntrospectRequest {
            archive_path: config.archive_path.clone(),
            classes_root: classes_root.clone(),
            sources: sources.into_iter().collect(),
            filter: cfg.filter.clone(),
        };
        let introspector = cfg.introspector.name();
        match cfg.introspector.introspect(&request) {
            Ok(classes) => IntrospectionReport {
                introspector,
                filter: cfg.filter.clone(),
                error: None,
                classes,
            },
            Err(e) => {
                warn!(introspector, error = %e, "introspection failed");
                IntrospectionReport {
                    introspector,
                    filter: cfg.filter.clone(),
                    error: Some(format!("{e:#}")),
                    classes: Vec::new(),
                }
            }
        }
    });

    Ok(RunReport {
        archive: config.archive_path.clone(),
        archive_sha256,
        extraction,
        classes_root,
        decompile_dir: config.decompile_dir.clone(),
        decompiler: config.decompiler.name(),
        dispatch,
        files: Vec::new(),
        introspection,
        duration_ms: millis(start.elapsed()),
    })
}

/// Forwards progress and remembers which sources this run produced.
struct SourceTracking<'a, R> {
    inner: &'a mut R,
    classes_root: &'a Path,
    sources: BTreeSet<DecompiledSource>,
}

impl<R: Reporter> Reporter for SourceTracking<'_, R> {
    fn extracted(&mut self, summary: &ExtractSummary) {
        self.inner.extracted(summary);
    }

    fn dispatched(&mut self, class_file: &Path) {
        self.inner.dispatched(class_file);
    }

    fn finished(&mut self, report: &FileReport) {
        if report.outcome.is_success()
            && let Some(source) =
                DecompiledSource::for_class(self.classes_root, &report.class_file, &report.output_dir)
        {
            self.sources.insert(source);
        }
        self.inner.finished(report);
    }
}

/// Maps a finished run to its final status.
pub fn check(report: &RunReport) -> std::result::Result<(), Error> {
    if report.dispatch.unsuccessful() > 0 {
        return Err(Error::DecompileFailures {
            failed: report.dispatch.unsuccessful(),
            attempted: report.dispatch.attempted,
        });
    }
    if let Some(introspection) = &report.introspection
        && let Some(reason) = &introspection.error
    {
        return Err(Error::Introspection {
            introspector: introspection.introspector,
            reason: reason.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompile::DecompilerTool;
    use std::fs::File;
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};
    use zip::write::{FileOptions, ZipWriter};

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "class_recover_pipeline_test_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    fn write_jar(path: &Path, entries: &[(&str, &[u8])]) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut zip = ZipWriter::new(File::create(path)?);
        for (name, content) in entries {
            zip.start_file(*name, FileOptions::default())?;
            zip.write_all(content)?;
        }
        zip.finish()?;
        Ok(())
    }

    fn config(base: &Path, archive: PathBuf, tool: DecompilerTool) -> PipelineConfig {
        let mut config = PipelineConfig::new(archive, tool);
        config.extract_dir = base.join("extracted");
        config.decompile_dir = base.join("decompiled");
        config
    }

    #[test]
    fn missing_archive_halts_before_dispatch() {
        let base = temp_dir("missing");
        let config = config(
            &base,
            base.join("nope.jar"),
            DecompilerTool::cfr(base.join("cfr"), "java".into()),
        );

        let mut dispatched = 0usize;
        let err = run(&config, &mut |_: &FileReport| dispatched += 1).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::NotFound { .. })
        ));
        assert_eq!(dispatched, 0);
        assert!(!config.decompile_dir.exists());
    }

    #[test]
    fn missing_archive_never_fetches_the_decompiler() {
        let base = temp_dir("no_fetch");
        let managed = base.join("home/tools/cfr.jar");
        let mut config = config(
            &base,
            base.join("nope.jar"),
            DecompilerTool::cfr(managed.clone(), "java".into()),
        );
        config.fetch_decompiler = true;

        let err = run(&config, &mut |_: &FileReport| {}).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::NotFound { .. })
        ));
        assert!(!managed.exists());
        assert!(!base.join("home").exists());
    }

    #[test]
    fn archive_without_classes_never_fetches_the_decompiler() -> Result<()> {
        let base = temp_dir("no_classes");
        let jar = base.join("resources.jar");
        write_jar(&jar, &[("application.properties", b"server.port=8080\n")])?;
        let managed = base.join("home/tools/cfr.jar");
        let mut config = config(&base, jar, DecompilerTool::cfr(managed.clone(), "java".into()));
        config.fetch_decompiler = true;

        let report = run(&config, &mut |_: &FileReport| {})?;
        assert_eq!(report.dispatch.attempted, 0);
        assert!(!base.join("home").exists());

        let _ = std::fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn missing_tool_completes_with_zero_successes() -> Result<()> {
        let base = temp_dir("missing_tool");
        let jar = base.join("demo.jar");
        write_jar(&jar, &[("a.class", b"A"), ("b.txt", b"B"), ("sub/c.class", b"C")])?;
        let config = config(
            &base,
            jar,
            DecompilerTool::cfr(base.join("missing-cfr.jar"), "java".into()),
        );

        let mut reports = Vec::new();
        let report = run(&config, &mut |r: &FileReport| reports.push(r.clone()))?;
        assert_eq!(report.extraction.files, 3);
        assert_eq!(report.dispatch.attempted, 2);
        assert_eq!(report.dispatch.succeeded, 0);
        assert_eq!(report.dispatch.tool_errors, 2);
        assert_eq!(reports.len(), 2);
        assert_eq!(report.archive_sha256.len(), 64);
        assert!(matches!(
            check(&report),
            Err(Error::DecompileFailures {
                failed: 2,
                attempted: 2
            })
        ));

        let _ = std::fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn classes_subdir_limits_enumeration() -> Result<()> {
        let base = temp_dir("subdir");
        let jar = base.join("boot.jar");
        write_jar(
            &jar,
            &[
                ("BOOT-INF/classes/com/example/App.class", b"A"),
                ("org/springframework/boot/loader/Launcher.class", b"L"),
            ],
        )?;
        let mut config = config(
            &base,
            jar,
            DecompilerTool::cfr(base.join("missing-cfr.jar"), "java".into()),
        );
        config.classes_subdir = Some(PathBuf::from("BOOT-INF/classes"));

        let mut seen = Vec::new();
        let report = run(&config, &mut |r: &FileReport| seen.push(r.class_file.clone()))?;
        assert_eq!(report.dispatch.attempted, 1);
        assert!(seen[0].ends_with("BOOT-INF/classes/com/example/App.class"));

        let _ = std::fs::remove_dir_all(base);
        Ok(())
    }
}
