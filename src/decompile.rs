use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// External program used to recover source from a single class file.
#[derive(Debug, Clone)]
pub enum DecompilerTool {
    /// CFR, either as `cfr.jar` (run through `java -jar`) or as a launcher executable.
    Cfr { path: PathBuf, java: PathBuf },
    /// `javap -c -p`, the bytecode disassembler shipped with the JDK.
    Javap { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DecompileOutcome {
    Succeeded,
    Failed { diagnostic: String, timed_out: bool },
    ToolInvocationError { reason: String },
}

impl DecompileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl DecompilerTool {
    pub fn cfr(path: PathBuf, java: PathBuf) -> Self {
        Self::Cfr { path, java }
    }

    pub fn javap(path: PathBuf) -> Self {
        Self::Javap { path }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cfr { .. } => "cfr",
            Self::Javap { .. } => "javap",
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Cfr { path, .. } | Self::Javap { path } => path,
        }
    }

    fn is_jar(&self) -> bool {
        matches!(self, Self::Cfr { path, .. }
            if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("jar")))
    }

    fn command(&self, class_file: &Path, output_dir: &Path) -> Command {
        match self {
            Self::Cfr { path, java } => {
                let mut cmd = if self.is_jar() {
                    let mut cmd = Command::new(java);
                    cmd.arg("-jar").arg(path);
                    cmd
                } else {
                    Command::new(path)
                };
                cmd.arg(class_file).arg("--outputdir").arg(output_dir);
                cmd
            }
            Self::Javap { path } => {
                let mut cmd = Command::new(path);
                cmd.args(["-c", "-p"]).arg(class_file);
                cmd
            }
        }
    }

    /// Runs the tool on one class file, writing recovered output into `output_dir`.
    ///
    /// Never returns an error: every way the run can go wrong is folded into the
    /// returned outcome so the caller can move on to the next file.
    pub fn decompile(
        &self,
        class_file: &Path,
        output_dir: &Path,
        timeout: Option<Duration>,
    ) -> DecompileOutcome {
        if self.is_jar() && !self.path().is_file() {
            return DecompileOutcome::ToolInvocationError {
                reason: format!("decompiler archive not found: {}", self.path().display()),
            };
        }

        if let Err(e) = std::fs::create_dir_all(output_dir) {
            return DecompileOutcome::ToolInvocationError {
                reason: format!("cannot create {}: {e}", output_dir.display()),
            };
        }

        let captured = match run_captured(self.command(class_file, output_dir), timeout) {
            Ok(c) => c,
            Err(e) => {
                return DecompileOutcome::ToolInvocationError {
                    reason: format!("failed to execute {}: {e}", self.path().display()),
                };
            }
        };

        let Some(status) = captured.status else {
            return DecompileOutcome::Failed {
                diagnostic: format!(
                    "timed out after {}s",
                    timeout.unwrap_or_default().as_secs_f32()
                ),
                timed_out: true,
            };
        };

        if !status.success() {
            return DecompileOutcome::Failed {
                diagnostic: captured.diagnostic(status),
                timed_out: false,
            };
        }

        if let Self::Javap { .. } = self {
            let stem = class_file
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "class".to_string());
            let listing = output_dir.join(format!("{stem}.javap.txt"));
            if let Err(e) = std::fs::write(&listing, &captured.stdout) {
                return DecompileOutcome::Failed {
                    diagnostic: format!("cannot write {}: {e}", listing.display()),
                    timed_out: false,
                };
            }
        }

        DecompileOutcome::Succeeded
    }
}

#[derive(Debug)]
pub(crate) struct Captured {
    /// `None` when the process was killed after running past its timeout.
    pub status: Option<ExitStatus>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Captured {
    pub fn diagnostic(&self, status: ExitStatus) -> String {
        let stderr = String::from_utf8_lossy(&self.stderr);
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = String::from_utf8_lossy(&self.stdout);
        let stdout = stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        format!("exited with {status}")
    }
}

/// Spawns `cmd` with piped output and waits for it, killing it once `timeout` elapses.
pub(crate) fn run_captured(
    mut cmd: Command,
    timeout: Option<Duration>,
) -> std::io::Result<Captured> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    debug!(command = ?cmd, "spawning");

    let mut child = cmd.spawn()?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let start = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if timeout.is_some_and(|t| start.elapsed() >= t) {
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    // A killed process may leave descendants holding the pipes open; don't wait on them.
    if status.is_none() {
        return Ok(Captured {
            status,
            stdout: Vec::new(),
            stderr: Vec::new(),
        });
    }

    Ok(Captured {
        status,
        stdout: join_drain(stdout),
        stderr: join_drain(stderr),
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_drain(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "class_recover_decompile_test_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    fn write_script(path: &Path, content: &str) -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms)?;
        Ok(())
    }

    #[test]
    fn cfr_jar_runs_through_java_with_outputdir() -> anyhow::Result<()> {
        let base = temp_dir("cfr_jar");
        let fake_cfr = base.join("cfr.jar");
        let fake_java = base.join("bin/java");
        let class_file = base.join("classes/Demo.class");
        let out = base.join("out");
        fs::create_dir_all(class_file.parent().unwrap())?;
        fs::write(&fake_cfr, "stub")?;
        fs::write(&class_file, "stub")?;
        write_script(
            &fake_java,
            r#"#!/bin/sh
set -e
if [ "$1" = "-jar" ] && [ "$4" = "--outputdir" ]; then
  echo "public class Demo {}" > "$5/Demo.java"
else
  echo "unexpected args: $*" >&2
  exit 1
fi
"#,
        )?;

        let tool = DecompilerTool::cfr(fake_cfr, fake_java);
        let outcome = tool.decompile(&class_file, &out, Some(Duration::from_secs(10)));
        assert_eq!(outcome, DecompileOutcome::Succeeded);
        assert!(fs::read_to_string(out.join("Demo.java"))?.contains("public class Demo"));

        let _ = fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn non_zero_exit_surfaces_stderr() -> anyhow::Result<()> {
        let base = temp_dir("failure");
        let fake_cfr = base.join("cfr");
        write_script(
            &fake_cfr,
            r#"#!/bin/sh
echo "boom from fake cfr" >&2
exit 1
"#,
        )?;

        let tool = DecompilerTool::cfr(fake_cfr, PathBuf::from("java"));
        let outcome = tool.decompile(&base.join("A.class"), &base.join("out"), None);
        match outcome {
            DecompileOutcome::Failed {
                diagnostic,
                timed_out,
            } => {
                assert_eq!(diagnostic, "boom from fake cfr");
                assert!(!timed_out);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let _ = fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn missing_executable_is_tool_invocation_error() {
        let base = temp_dir("missing_tool");
        let tool = DecompilerTool::cfr(base.join("no-such-cfr"), PathBuf::from("java"));
        let outcome = tool.decompile(&base.join("A.class"), &base.join("out"), None);
        assert!(matches!(outcome, DecompileOutcome::ToolInvocationError { .. }));

        let jar_tool = DecompilerTool::cfr(base.join("missing.jar"), PathBuf::from("java"));
        let outcome = jar_tool.decompile(&base.join("A.class"), &base.join("out"), None);
        match outcome {
            DecompileOutcome::ToolInvocationError { reason } => {
                assert!(reason.contains("missing.jar"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn hanging_tool_is_killed_after_timeout() -> anyhow::Result<()> {
        let base = temp_dir("timeout");
        let fake_cfr = base.join("cfr");
        write_script(&fake_cfr, "#!/bin/sh\nexec sleep 30\n")?;

        let tool = DecompilerTool::cfr(fake_cfr, PathBuf::from("java"));
        let start = Instant::now();
        let outcome = tool.decompile(
            &base.join("A.class"),
            &base.join("out"),
            Some(Duration::from_millis(200)),
        );
        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(matches!(
            outcome,
            DecompileOutcome::Failed {
                timed_out: true,
                ..
            }
        ));

        let _ = fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn javap_listing_is_written_next_to_outputs() -> anyhow::Result<()> {
        let base = temp_dir("javap");
        let fake_javap = base.join("javap");
        write_script(
            &fake_javap,
            r#"#!/bin/sh
echo "Compiled from \"Demo.java\""
echo "public class Demo {"
echo "}"
"#,
        )?;

        let tool = DecompilerTool::javap(fake_javap);
        let out = base.join("out");
        let outcome = tool.decompile(&base.join("Demo.class"), &out, None);
        assert!(outcome.is_success());
        assert!(fs::read_to_string(out.join("Demo.javap.txt"))?.contains("public class Demo"));

        let _ = fs::remove_dir_all(base);
        Ok(())
    }
}
