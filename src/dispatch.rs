use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::decompile::{DecompileOutcome, DecompilerTool};
use crate::extract::ExtractSummary;

/// Where each class file's recovered output lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputLayout {
    /// Every class writes into the one decompile directory. Same-named outputs overwrite each other.
    #[default]
    Shared,
    /// Each class gets `<decompile dir>/<relative path without .class>/`.
    PerClass,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub class_file: PathBuf,
    pub output_dir: PathBuf,
    #[serde(flatten)]
    pub outcome: DecompileOutcome,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub tool_errors: usize,
}

impl DispatchSummary {
    fn record(&mut self, outcome: &DecompileOutcome) {
        self.attempted += 1;
        match outcome {
            DecompileOutcome::Succeeded => self.succeeded += 1,
            DecompileOutcome::Failed { .. } => self.failed += 1,
            DecompileOutcome::ToolInvocationError { .. } => self.tool_errors += 1,
        }
    }

    /// Files that did not produce output, whatever the reason.
    pub fn unsuccessful(&self) -> usize {
        self.failed + self.tool_errors
    }
}

/// Receives per-file progress as the batch runs.
pub trait Reporter: Send {
    fn extracted(&mut self, _summary: &ExtractSummary) {}
    fn dispatched(&mut self, _class_file: &Path) {}
    fn finished(&mut self, report: &FileReport);
}

impl<F: FnMut(&FileReport) + Send> Reporter for F {
    fn finished(&mut self, report: &FileReport) {
        self(report)
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub(crate) fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    tool: DecompilerTool,
    root: PathBuf,
    decompile_dir: PathBuf,
    layout: OutputLayout,
    timeout: Option<Duration>,
    jobs: usize,
}

impl Dispatcher {
    pub fn new(tool: DecompilerTool, root: PathBuf, decompile_dir: PathBuf) -> Self {
        Self {
            tool,
            root,
            decompile_dir,
            layout: OutputLayout::Shared,
            timeout: None,
            jobs: 1,
        }
    }

    pub fn layout(mut self, layout: OutputLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn output_dir_for(&self, class_file: &Path) -> PathBuf {
        match self.layout {
            OutputLayout::Shared => self.decompile_dir.clone(),
            OutputLayout::PerClass => {
                let relative = class_file
                    .strip_prefix(&self.root)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|_| class_file.file_name().map(PathBuf::from).unwrap_or_default());
                self.decompile_dir.join(relative.with_extension(""))
            }
        }
    }

    pub fn dispatch_one(&self, class_file: &Path) -> FileReport {
        let start = Instant::now();
        let output_dir = self.output_dir_for(class_file);
        let outcome = self.tool.decompile(class_file, &output_dir, self.timeout);
        debug!(class_file = %class_file.display(), ?outcome, "dispatch finished");
        FileReport {
            class_file: class_file.to_path_buf(),
            output_dir,
            outcome,
            duration_ms: millis(start.elapsed()),
        }
    }

    /// Decompiles every file, reporting each outcome as soon as it is known.
    ///
    /// A failing file never stops the batch.
    pub fn run<I, R>(&self, files: I, reporter: &mut R) -> DispatchSummary
    where
        I: IntoIterator<Item = PathBuf>,
        R: Reporter,
    {
        if let Err(e) = std::fs::create_dir_all(&self.decompile_dir) {
            warn!(dir = %self.decompile_dir.display(), error = %e, "cannot create decompile directory");
        }

        if self.jobs > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(self.jobs).build() {
                Ok(pool) => {
                    let files: Vec<PathBuf> = files.into_iter().collect();
                    return pool.install(|| self.run_parallel(&files, reporter));
                }
                Err(e) => warn!(error = %e, "falling back to sequential dispatch"),
            }
        }

        let mut summary = DispatchSummary::default();
        for class_file in files {
            reporter.dispatched(&class_file);
            let report = self.dispatch_one(&class_file);
            summary.record(&report.outcome);
            reporter.finished(&report);
        }
        summary
    }

    fn run_parallel<R: Reporter>(&self, files: &[PathBuf], reporter: &mut R) -> DispatchSummary {
        let reporter = Mutex::new(reporter);
        let summary = Mutex::new(DispatchSummary::default());

        files.par_iter().for_each(|class_file| {
            reporter
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .dispatched(class_file);
            let report = self.dispatch_one(class_file);
            summary
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .record(&report.outcome);
            reporter
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .finished(&report);
        });

        summary.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}
