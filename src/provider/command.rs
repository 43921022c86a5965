//! Shell command provider adapter
//!
//! Each operation runs the type's configured command through `sh -c`.
//! The resolved inputs are written to the command's stdin as a JSON object
//! and the context is passed in `KEEL_*` environment variables:
//!
//! | variable | value |
//! |----------|-------|
//! | `KEEL_OPERATION` | `create`, `update` or `delete` |
//! | `KEEL_RESOURCE` | logical name |
//! | `KEEL_TYPE` | resource type |
//! | `KEEL_ATTEMPT` | 1-indexed attempt number |
//! | `KEEL_IDENTITY` | live identity (update, delete) |
//! | `KEEL_OLD_INPUTS` | previous inputs as JSON (update) |
//!
//! `create` must print a JSON object with an `id` key; `update` may print
//! an object of new attributes. Exit status 75 (`EX_TEMPFAIL`) marks the
//! failure as retryable; anything else non-zero is permanent.

use anyhow::{Result, bail};
use converge::{
    Attributes, Created, DiffVerdict, Inputs, OpContext, ProviderError, ProviderResult,
    ReplaceStrategy, ResourceProvider,
};
use serde_json::Value;
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::TypeConfig;

/// Exit status that asks for a retry
pub const EXIT_TEMPFAIL: i32 = 75;

/// How often a running command is checked for exit or cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Provider that shells out for every operation
#[derive(Debug)]
pub struct CommandProvider {
    label: String,
    config: TypeConfig,
}

/// Captured result of one command
struct Finished {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Threads feeding and draining the child's pipes
struct Pipes {
    stdin: Option<JoinHandle<()>>,
    stdout: Option<JoinHandle<Vec<u8>>>,
    stderr: Option<JoinHandle<Vec<u8>>>,
}

impl Pipes {
    fn attach(child: &mut Child, payload: Vec<u8>) -> Self {
        // Pipes are drained on their own threads so a chatty command cannot block on a full buffer.
        Self {
            stdin: child.stdin.take().map(|mut stdin| {
                thread::spawn(move || {
                    let _ = stdin.write_all(&payload);
                })
            }),
            stdout: child.stdout.take().map(|pipe| thread::spawn(move || drain(pipe))),
            stderr: child.stderr.take().map(|pipe| thread::spawn(move || drain(pipe))),
        }
    }

    fn join(self) -> (Vec<u8>, Vec<u8>) {
        if let Some(handle) = self.stdin {
            let _ = handle.join();
        }
        (
            self.stdout.and_then(|h| h.join().ok()).unwrap_or_default(),
            self.stderr.and_then(|h| h.join().ok()).unwrap_or_default(),
        )
    }
}

impl CommandProvider {
    pub fn new(resource_type: &str, config: TypeConfig) -> Result<Self> {
        if config.create.as_deref().is_none_or(|c| c.trim().is_empty()) {
            bail!("type `{resource_type}` uses the command provider but has no `create` command");
        }
        Ok(Self {
            label: resource_type.to_string(),
            config,
        })
    }

    /// Run `script` to completion, honouring cancellation and the command timeout
    fn execute(
        &self,
        ctx: &OpContext<'_>,
        operation: &str,
        script: &str,
        identity: Option<&str>,
        inputs: &Inputs,
        old: Option<&Inputs>,
    ) -> ProviderResult<String> {
        let payload = serde_json::to_vec(inputs)
            .map_err(|e| ProviderError::permanent(format!("could not encode inputs: {e}")))?;

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(script)
            .envs(&self.config.env)
            .env("KEEL_OPERATION", operation)
            .env("KEEL_RESOURCE", ctx.resource)
            .env("KEEL_TYPE", ctx.resource_type)
            .env("KEEL_ATTEMPT", ctx.attempt.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so a kill also reaches whatever the script started.
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut command, 0);
        if let Some(identity) = identity {
            command.env("KEEL_IDENTITY", identity);
        }
        if let Some(old) = old {
            let encoded = serde_json::to_string(old)
                .map_err(|e| ProviderError::permanent(format!("could not encode inputs: {e}")))?;
            command.env("KEEL_OLD_INPUTS", encoded);
        }

        log::info!("[{}] {operation} {}: sh -c {script:?}", self.label, ctx.resource);
        let child = command
            .spawn()
            .map_err(|e| ProviderError::retryable(format!("could not start `sh`: {e}")))?;
        let finished = self.wait(ctx, child, payload)?;

        if finished.status.success() {
            return String::from_utf8(finished.stdout).map_err(|e| {
                ProviderError::permanent(format!("{operation} command printed non-UTF-8 output: {e}"))
            });
        }

        let stderr = String::from_utf8_lossy(&finished.stderr);
        let detail = stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("no output")
            .trim()
            .to_string();
        match finished.status.code() {
            Some(EXIT_TEMPFAIL) => Err(ProviderError::retryable(format!(
                "{operation} command asked for a retry: {detail}"
            ))),
            Some(code) => Err(ProviderError::permanent(format!(
                "{operation} command exited with status {code}: {detail}"
            ))),
            None => Err(ProviderError::permanent(format!(
                "{operation} command was killed by a signal: {detail}"
            ))),
        }
    }

    fn wait(&self, ctx: &OpContext<'_>, mut child: Child, payload: Vec<u8>) -> ProviderResult<Finished> {
        let pipes = Pipes::attach(&mut child, payload);

        let deadline = self
            .config
            .command_timeout_secs
            .and_then(|secs| Instant::now().checked_add(Duration::from_secs(secs)));

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    return Err(ProviderError::retryable(format!("could not wait for command: {e}")));
                }
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                kill(&mut child, pipes);
                return Err(ProviderError::retryable(format!(
                    "command timed out after {}s",
                    self.config.command_timeout_secs.unwrap_or_default()
                )));
            }
            if !ctx.cancel.sleep(POLL_INTERVAL) {
                kill(&mut child, pipes);
                return Err(ProviderError::cancelled());
            }
        };

        let (stdout, stderr) = pipes.join();
        Ok(Finished {
            status,
            stdout,
            stderr,
        })
    }
}

fn drain(mut pipe: impl Read) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf);
    buf
}

/// Kill the command and everything it spawned, then reap the pipe threads
fn kill(child: &mut Child, pipes: Pipes) {
    let group_killed = kill_group(child.id());
    if let Err(e) = child.kill() {
        log::debug!("Failed to kill command: {e}");
    }
    let _ = child.wait();

    if group_killed {
        pipes.join();
    } else {
        // Something outside the group may still hold the pipes open; leave the threads detached.
        log::warn!("Could not kill process group {}; output threads left running", child.id());
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) -> bool {
    // The shell builtin, since `sh` is all this adapter assumes.
    Command::new("sh")
        .arg("-c")
        .arg(format!("kill -s KILL -- -{pgid}"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) -> bool {
    false
}

/// Parse a command's stdout as an attribute object
fn parse_attributes(operation: &str, stdout: &str) -> ProviderResult<Attributes> {
    if stdout.trim().is_empty() {
        return Ok(Attributes::new());
    }
    match serde_json::from_str::<Value>(stdout.trim()) {
        Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
        Ok(other) => Err(ProviderError::permanent(format!(
            "{operation} command printed {other}, expected a JSON object"
        ))),
        Err(e) => Err(ProviderError::permanent(format!(
            "{operation} command printed invalid JSON: {e}"
        ))),
    }
}

impl ResourceProvider for CommandProvider {
    fn create(&self, ctx: &OpContext<'_>, inputs: &Inputs) -> ProviderResult<Created> {
        let script = self.config.create.as_deref().unwrap_or_default();
        let stdout = self.execute(ctx, "create", script, None, inputs, None)?;
        let mut attributes = parse_attributes("create", &stdout)?;

        let identity = match attributes.remove("id") {
            Some(Value::String(id)) if !id.is_empty() => id,
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(ProviderError::permanent(
                    "create command did not print a non-empty `id`",
                ));
            }
        };
        Ok(Created {
            identity,
            attributes,
        })
    }

    fn diff(&self, _resource_type: &str, old: &Inputs, new: &Inputs) -> DiffVerdict {
        super::classify(&self.config, old, new, self.config.update.is_some())
    }

    fn update(
        &self,
        ctx: &OpContext<'_>,
        identity: &str,
        old: &Inputs,
        new: &Inputs,
    ) -> ProviderResult<Attributes> {
        let Some(script) = self.config.update.as_deref() else {
            return Err(ProviderError::permanent("type has no `update` command"));
        };
        let stdout = self.execute(ctx, "update", script, Some(identity), new, Some(old))?;
        let mut attributes = parse_attributes("update", &stdout)?;
        attributes.remove("id");
        Ok(attributes)
    }

    fn delete(&self, ctx: &OpContext<'_>, identity: &str, inputs: &Inputs) -> ProviderResult<()> {
        match self.config.delete.as_deref() {
            Some(script) => self
                .execute(ctx, "delete", script, Some(identity), inputs, None)
                .map(|_| ()),
            None => {
                log::info!(
                    "[{}] no delete command, forgetting {identity}",
                    self.label
                );
                Ok(())
            }
        }
    }

    fn replace_strategy(&self, _resource_type: &str) -> ReplaceStrategy {
        self.config.replace_strategy.unwrap_or_default()
    }
}
