use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "class-recover", version)]
#[command(about = "Unpack a Java archive and decompile every class file it contains")]
pub struct Cli {
    /// Path to the jar (or any zip archive) to unpack
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    #[arg(long, value_name = "DIR", default_value = "extracted_classes")]
    pub extract_dir: PathBuf,

    #[arg(long, value_name = "DIR", default_value = "decompiled_sources")]
    pub decompile_dir: PathBuf,

    /// Decompiler jar or executable (defaults to $CFR_JAR, ./cfr.jar, then a managed copy)
    #[arg(long, value_name = "FILE")]
    pub decompiler_path: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = DecompilerKind::Cfr)]
    pub decompiler: DecompilerKind,

    /// Only enumerate class files below this path of the extraction root, e.g. BOOT-INF/classes
    #[arg(long, value_name = "PATH")]
    pub classes_subdir: Option<PathBuf>,

    #[arg(short = 'j', long, value_name = "N", default_value_t = 1)]
    pub jobs: usize,

    /// Per-file decompiler timeout in seconds; 0 waits forever
    #[arg(long, value_name = "SECS", default_value_t = 120)]
    pub timeout: u64,

    /// Give each class its own output directory instead of one shared directory
    #[arg(long)]
    pub isolate: bool,

    /// Inspect classes whose fully-qualified name contains FILTER
    #[arg(long, value_name = "FILTER")]
    pub introspect: Option<String>,

    #[arg(long, value_enum, default_value_t = IntrospectorKind::Source)]
    pub introspector: IntrospectorKind,

    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum DecompilerKind {
    Cfr,
    Javap,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum IntrospectorKind {
    Source,
    Reflection,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
