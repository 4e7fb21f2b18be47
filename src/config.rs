use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::cli::{Cli, DecompilerKind, IntrospectorKind};
use crate::decompile::DecompilerTool;
use crate::dispatch::OutputLayout;
use crate::introspect::{Introspector, ReflectionIntrospector, SourceIntrospector};

const CFR_URL: &str = "https://github.com/leibnitz27/cfr/releases/download/0.152/cfr-0.152.jar";

/// Everything one pipeline run needs; nothing is read from globals after this is built.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub archive_path: PathBuf,
    pub extract_dir: PathBuf,
    pub decompile_dir: PathBuf,
    pub decompiler: DecompilerTool,
    pub classes_subdir: Option<PathBuf>,
    pub jobs: usize,
    pub timeout: Option<Duration>,
    pub layout: OutputLayout,
    pub introspection: Option<IntrospectConfig>,
    /// Download CFR to the decompiler path before the first dispatch.
    pub fetch_decompiler: bool,
}

#[derive(Debug, Clone)]
pub struct IntrospectConfig {
    pub filter: String,
    pub introspector: Arc<dyn Introspector>,
}

impl PipelineConfig {
    /// Config with the classic defaults: shared output directory, sequential dispatch.
    pub fn new(archive_path: PathBuf, decompiler: DecompilerTool) -> Self {
        Self {
            archive_path,
            extract_dir: PathBuf::from("extracted_classes"),
            decompile_dir: PathBuf::from("decompiled_sources"),
            decompiler,
            classes_subdir: None,
            jobs: 1,
            timeout: Some(Duration::from_secs(120)),
            layout: OutputLayout::Shared,
            introspection: None,
            fetch_decompiler: false,
        }
    }
}

pub fn resolve(cli: &Cli) -> Result<PipelineConfig> {
    let java = resolve_java_bin("CLASS_RECOVER_JAVA", "java");
    let (decompiler, fetch_decompiler) = match cli.decompiler {
        DecompilerKind::Cfr => {
            let (path, fetch) = resolve_cfr_path(cli)?;
            (DecompilerTool::cfr(path, java.clone()), fetch)
        }
        DecompilerKind::Javap => (
            DecompilerTool::javap(
                cli.decompiler_path
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("javap")),
            ),
            false,
        ),
    };

    let timeout = (cli.timeout > 0).then(|| Duration::from_secs(cli.timeout));

    let introspection = cli.introspect.clone().map(|filter| {
        let introspector: Arc<dyn Introspector> = match cli.introspector {
            IntrospectorKind::Source => Arc::new(SourceIntrospector),
            IntrospectorKind::Reflection => Arc::new(ReflectionIntrospector::new(
                java.clone(),
                resolve_java_bin("CLASS_RECOVER_JAVAC", "javac"),
                timeout,
            )),
        };
        IntrospectConfig {
            filter,
            introspector,
        }
    });

    Ok(PipelineConfig {
        archive_path: cli.archive.clone(),
        extract_dir: cli.extract_dir.clone(),
        decompile_dir: cli.decompile_dir.clone(),
        decompiler,
        classes_subdir: cli.classes_subdir.clone(),
        jobs: cli.jobs.max(1),
        timeout,
        layout: if cli.isolate {
            OutputLayout::PerClass
        } else {
            OutputLayout::Shared
        },
        introspection,
        fetch_decompiler,
    })
}

fn resolve_java_bin(var: &str, default: &str) -> PathBuf {
    env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

/// Returns the CFR path and whether it still has to be downloaded.
///
/// Nothing is fetched here; the pipeline calls [`install_cfr_if_missing`]
/// once the archive has been extracted and there is something to decompile.
pub fn resolve_cfr_path(cli: &Cli) -> Result<(PathBuf, bool)> {
    let managed = class_recover_home()?.join("tools").join("cfr.jar");
    let local = Path::new("cfr.jar");

    match pick_cfr_path(
        cli.decompiler_path.as_deref(),
        env::var_os("CFR_JAR").map(PathBuf::from),
        local,
        &managed,
    ) {
        Some(p) => Ok((p, false)),
        None => Ok((managed, true)),
    }
}

/// Lookup order: explicit flag, `$CFR_JAR`, `./cfr.jar`, then the managed copy.
/// `None` means the managed copy still has to be downloaded.
fn pick_cfr_path(
    explicit: Option<&Path>,
    from_env: Option<PathBuf>,
    local: &Path,
    managed: &Path,
) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    if let Some(p) = from_env.filter(|p| !p.as_os_str().is_empty()) {
        return Some(p);
    }
    if local.is_file() {
        return Some(local.to_path_buf());
    }
    if managed.exists() {
        return Some(managed.to_path_buf());
    }
    None
}

fn class_recover_home() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::cache_dir)
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow::anyhow!("Failed to resolve data directory"))?;
    Ok(base.join("class-recover"))
}

pub fn install_cfr_if_missing(target_path: &Path) -> Result<()> {
    if target_path.exists() {
        return Ok(());
    }

    if let Some(parent) = target_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    info!(target = %target_path.display(), "CFR not found, downloading");
    let status = std::process::Command::new("curl")
        .args(["-L", "--fail", "--silent", "--show-error", "-o"])
        .arg(target_path)
        .arg(CFR_URL)
        .status()
        .context(
            "Failed to execute curl (ensure curl is installed, or use --decompiler-path to specify cfr.jar)",
        )?;

    if !status.success() {
        let _ = std::fs::remove_file(target_path);
        anyhow::bail!(
            "Failed to download CFR. You can use --decompiler-path to specify a local cfr.jar"
        );
    }

    Ok(())
}
