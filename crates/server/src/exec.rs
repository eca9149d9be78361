//! Subprocess invocation with output forwarded into the deploy log.

use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::process::Command;

use crate::stream::LogSink;

/// Failure of an external command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program}: {status}")]
    Failed { program: String, status: ExitStatus },
}

/// Run a command, forwarding its stdout and stderr into the log. Errors on
/// spawn failure or non-zero exit.
pub async fn run_logged(
    sink: &LogSink,
    program: &str,
    args: &[&str],
) -> Result<(), CommandError> {
    run_logged_env(sink, program, args, &[]).await
}

/// Like [`run_logged`], with extra environment variables for the child.
pub async fn run_logged_env(
    sink: &LogSink,
    program: &str,
    args: &[&str],
    envs: &[(&str, &str)],
) -> Result<(), CommandError> {
    sink.line(format!("$ {program} {}", args.join(" ")));
    let mut command = Command::new(program);
    command.args(args);
    for (key, value) in envs {
        command.env(key, value);
    }
    let output = command.output().await.map_err(|source| CommandError::Spawn {
        program: program.to_string(),
        source,
    })?;
    sink.raw(&String::from_utf8_lossy(&output.stdout));
    sink.raw(&String::from_utf8_lossy(&output.stderr));
    if !output.status.success() {
        return Err(CommandError::Failed {
            program: program.to_string(),
            status: output.status,
        });
    }
    Ok(())
}

/// Run a command solely for its exit status, without logging.
pub async fn probe(program: &str, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}
