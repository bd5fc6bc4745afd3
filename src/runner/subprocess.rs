//! Subprocess runner - executes commands with tokio::process

use crate::runner::{CommandOutput, CommandRunner, CommandSpec, OutputSink, OutputStream, RunnerError};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Runs commands as child processes, streaming output line by line
#[derive(Debug, Clone, Default)]
pub struct SubprocessRunner;

impl SubprocessRunner {
    pub fn new() -> Self {
        Self
    }
}

async fn read_lines<R>(
    reader: R,
    stream: OutputStream,
    sink: Option<&dyn OutputSink>,
) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut collected = String::new();

    // Output is not guaranteed to be UTF-8; decode lossily per line
    while reader.read_until(b'\n', &mut buf).await? > 0 {
        let text = String::from_utf8_lossy(&buf);
        let line = text.trim_end_matches(['\n', '\r']);
        if let Some(sink) = sink {
            sink.on_line(stream, line);
        }
        collected.push_str(line);
        collected.push('\n');
        buf.clear();
    }

    Ok(collected)
}

#[async_trait]
impl CommandRunner for SubprocessRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        sink: Option<&dyn OutputSink>,
    ) -> Result<CommandOutput, RunnerError> {
        debug!("Spawning: {}", command.display());
        let started = Instant::now();

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .envs(&command.env)
            .current_dir(&command.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RunnerError::Spawn {
                program: command.program.clone(),
                reason: e.to_string(),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::Internal("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::Internal("stderr was not captured".to_string()))?;

        let run = async {
            let (out, err) = tokio::try_join!(
                read_lines(stdout, OutputStream::Stdout, sink),
                read_lines(stderr, OutputStream::Stderr, sink),
            )?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((out, err, status))
        };

        let (stdout, stderr, status) = match command.timeout {
            Some(limit) => timeout(limit, run).await.map_err(|_| {
                warn!("Command timed out after {}s: {}", limit.as_secs(), command.display());
                RunnerError::Timeout(limit.as_secs())
            })??,
            None => run.await?,
        };

        let exit_code = status.code().unwrap_or(-1);
        debug!(
            "Command exited with code {} after {:?}: {}",
            exit_code,
            started.elapsed(),
            command.display()
        );

        Ok(CommandOutput::new(exit_code, stdout, stderr, started.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Collect(Mutex<Vec<(OutputStream, String)>>);

    impl OutputSink for Collect {
        fn on_line(&self, stream: OutputStream, line: &str) {
            self.0.lock().unwrap().push((stream, line.to_string()));
        }
    }

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", std::env::temp_dir())
            .with_args(vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let runner = SubprocessRunner::new();
        let sink = Collect(Mutex::new(Vec::new()));

        let output = runner
            .run(&sh("echo hello; echo oops >&2; exit 3"), Some(&sink))
            .await
            .unwrap();

        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout, "hello\n");
        assert_eq!(output.stderr, "oops\n");

        let lines = sink.0.lock().unwrap();
        assert!(lines.contains(&(OutputStream::Stdout, "hello".to_string())));
        assert!(lines.contains(&(OutputStream::Stderr, "oops".to_string())));
    }

    #[tokio::test]
    async fn test_invalid_utf8_output_is_not_an_error() {
        let runner = SubprocessRunner::new();
        let sink = Collect(Mutex::new(Vec::new()));

        let output = runner
            .run(&sh("printf 'caf\\351\\n'; printf 'tail'; exit 0"), Some(&sink))
            .await
            .unwrap();

        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout, "caf\u{FFFD}\ntail\n");

        let lines = sink.0.lock().unwrap();
        assert_eq!(
            *lines,
            vec![
                (OutputStream::Stdout, "caf\u{FFFD}".to_string()),
                (OutputStream::Stdout, "tail".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_env_is_passed() {
        let runner = SubprocessRunner::new();
        let mut spec = sh("echo \"$GREETING\"");
        spec.env.insert("GREETING".to_string(), "hi there".to_string());

        let output = runner.run(&spec, None).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hi there");
    }

    #[tokio::test]
    async fn test_timeout() {
        let runner = SubprocessRunner::new();
        let spec = sh("sleep 5").with_timeout(Some(Duration::from_millis(200)));

        let result = runner.run(&spec, None).await;
        assert!(matches!(result, Err(RunnerError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let runner = SubprocessRunner::new();
        let spec = CommandSpec::new("definitely-not-a-real-binary-cirun", std::env::temp_dir());

        let result = runner.run(&spec, None).await;
        assert!(matches!(result, Err(RunnerError::Spawn { .. })));
    }
}
