//! Linux HAL implementation spawning real processes.

use super::{CommandOutput, Invocation, ProcessOps};
use crate::{HalError, HalResult};
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;
use wait_timeout::ChildExt;

/// Real HAL implementation for Linux systems.
#[derive(Debug, Clone, Default)]
pub struct LinuxHal;

impl LinuxHal {
    pub fn new() -> Self {
        Self
    }
}

fn map_command_err(program: &str, err: std::io::Error) -> HalError {
    if err.kind() == std::io::ErrorKind::NotFound {
        return HalError::CommandNotFound(program.to_string());
    }
    HalError::Io(err)
}

fn wait_with_timeout(
    program: &str,
    child: &mut Child,
    timeout: Option<Duration>,
) -> HalResult<ExitStatus> {
    let Some(timeout) = timeout else {
        return Ok(child.wait()?);
    };
    match child.wait_timeout(timeout)? {
        Some(status) => Ok(status),
        None => {
            let _ = child.kill();
            let _ = child.wait();
            Err(HalError::CommandTimeout {
                program: program.to_string(),
                timeout_secs: timeout.as_secs(),
            })
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn captured_output(
    program: &str,
    cmd: &mut Command,
    timeout: Option<Duration>,
) -> HalResult<CommandOutput> {
    // Avoid commands hanging waiting for input.
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn().map_err(|e| map_command_err(program, e))?;

    // Drain pipes concurrently to avoid deadlocks on large output.
    let stdout_handle = drain(child.stdout.take());
    let stderr_handle = drain(child.stderr.take());

    // On timeout the drain threads are left detached: a grandchild that
    // inherited the pipes can keep them open long after the child is killed.
    let status = wait_with_timeout(program, &mut child, timeout)?;
    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();

    Ok(CommandOutput {
        code: status.code(),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

fn inherited_status(
    program: &str,
    cmd: &mut Command,
    timeout: Option<Duration>,
) -> HalResult<CommandOutput> {
    let mut child = cmd.spawn().map_err(|e| map_command_err(program, e))?;
    let status = wait_with_timeout(program, &mut child, timeout)?;
    Ok(CommandOutput {
        code: status.code(),
        ..CommandOutput::default()
    })
}

impl ProcessOps for LinuxHal {
    fn execute(&self, invocation: &Invocation) -> HalResult<CommandOutput> {
        log::info!("+ {}", invocation);

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        let output = if invocation.capture {
            captured_output(&invocation.program, &mut cmd, invocation.timeout)?
        } else {
            inherited_status(&invocation.program, &mut cmd, invocation.timeout)?
        };

        if !output.succeeded() {
            log::debug!("{} exited with {:?}", invocation.program, output.code);
        }
        output.check(invocation)
    }
}
