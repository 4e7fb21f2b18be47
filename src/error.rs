use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Invalid JAR file: {}: {reason}", path.display())]
    MalformedArchive { path: PathBuf, reason: String },

    #[error("Failed to write {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("{failed} of {attempted} class files failed to decompile")]
    DecompileFailures { failed: usize, attempted: usize },

    #[error("Introspection via {introspector} failed: {reason}")]
    Introspection {
        introspector: &'static str,
        reason: String,
    },
}

impl Error {
    /// Process exit code reported by the binary for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::NotFound { .. } => 3,
            Self::MalformedArchive { .. } => 4,
            Self::DecompileFailures { .. } | Self::Introspection { .. } => 5,
            Self::Io { .. } => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_one_failures_have_distinct_exit_codes() {
        let missing = Error::NotFound {
            path: PathBuf::from("demo.jar"),
        };
        let corrupt = Error::MalformedArchive {
            path: PathBuf::from("demo.jar"),
            reason: "invalid Zip archive".to_string(),
        };
        assert_eq!(missing.exit_code(), 3);
        assert_eq!(corrupt.exit_code(), 4);
        assert!(missing.to_string().contains("demo.jar"));
        assert!(corrupt.to_string().contains("invalid Zip archive"));

        let partial = Error::DecompileFailures {
            failed: 1,
            attempted: 3,
        };
        assert_eq!(partial.exit_code(), 5);
        assert_eq!(partial.to_string(), "1 of 3 class files failed to decompile");
    }
}
