// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Firmguard Authors

use crate::error::{Error, Result};
use log::*;
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;

/*
 * Input:
 *     program: executable to run, looked up in PATH
 *     args: arguments passed verbatim, no shell is involved
 *     timeout: upper bound for the whole execution
 * return:
 *     the captured output of a successful execution
 *     Error::Io if the program cannot be started
 *     Error::Timeout if it runs for longer than `timeout`; the child is killed
 *     Error::Execution with its exit code and stderr if it fails
 */
pub async fn run(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<Output> {
    let command_line = display_command(program, args);
    debug!("Running '{command_line}' with a timeout of {timeout:?}");

    let t0 = Instant::now();
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::io(program, e))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output())
        .await
    {
        Ok(result) => result.map_err(|e| Error::io(program, e))?,
        Err(_) => {
            warn!("'{command_line}' did not finish within {timeout:?}");
            return Err(Error::Timeout {
                command: command_line,
                timeout,
            });
        }
    };

    debug!(
        "'{command_line}' exited with {:?} after {:?}",
        output.status.code(),
        t0.elapsed()
    );

    if !output.status.success() {
        return Err(Error::try_from(output)?);
    }

    Ok(output)
}

/// Run a whitespace separated command line and return its stdout as text
pub async fn run_command_line(
    command_line: &str,
    timeout: Duration,
) -> Result<String> {
    let mut words = command_line.split_whitespace();
    let program = words.next().ok_or_else(|| {
        Error::Other("cannot run an empty command line".to_string())
    })?;
    let args: Vec<&str> = words.collect();

    let output = run(program, &args, timeout).await?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn display_command(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
