//! External programs started alongside the relay.
//!
//! A host typically launches its own client program next to the relay and
//! expects it to go away with the relay. Every child is spawned with
//! `kill_on_drop`, and `kill_all` terminates and reaps them explicitly.

use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::domain::RelayError;

struct Companion {
    program: String,
    child: Child,
}

/// Killable handles of the programs started so far.
#[derive(Default)]
pub struct CompanionProcesses {
    companions: Vec<Companion>,
}

impl CompanionProcesses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch `program` with whitespace-separated `args`.
    ///
    /// With `show_window` unset the child is detached from the relay's stdio.
    /// Returns the OS process id when the platform reports one.
    pub fn start(
        &mut self,
        program: &str,
        show_window: bool,
        args: &str,
    ) -> Result<Option<u32>, RelayError> {
        let mut command = Command::new(program);
        command.args(args.split_whitespace()).kill_on_drop(true);
        if !show_window {
            command
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());
        }

        let child = command.spawn().map_err(|source| RelayError::Spawn {
            program: program.to_string(),
            source,
        })?;
        let pid = child.id();
        tracing::info!("Started program '{}' (pid {:?})", program, pid);

        self.companions.push(Companion {
            program: program.to_string(),
            child,
        });
        Ok(pid)
    }

    pub fn len(&self) -> usize {
        self.companions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.companions.is_empty()
    }

    /// Kill and reap every started program. Returns how many were tracked.
    pub async fn kill_all(&mut self) -> usize {
        let count = self.companions.len();
        for mut companion in self.companions.drain(..) {
            match companion.child.kill().await {
                Ok(()) => tracing::info!("Stopped program '{}'", companion.program),
                Err(e) => tracing::warn!(
                    "Failed to stop program '{}': {}",
                    companion.program,
                    e
                ),
            }
        }
        count
    }
}
