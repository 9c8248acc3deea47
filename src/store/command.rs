// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Cleanup and update steps as external commands.

use crate::store::{Collaborator, Step};

use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, instrument, warn};

/// Collaborator that runs each step as a child process.
///
/// Output of the child is inherited, so package manager progress stays
/// visible to whoever runs snapkeeper.
#[derive(Debug, Default, Clone)]
pub struct ShellCollaborator;

impl ShellCollaborator {
    /// Construct new shell collaborator.
    pub fn new() -> Self {
        Self
    }
}

impl Collaborator for ShellCollaborator {
    #[instrument(skip(self, step), fields(step = %step.name), level = "debug")]
    async fn run_step(&self, step: &Step) -> bool {
        let Some((program, args)) = step.command.split_first() else {
            warn!("step {:?} has no command to run", step.name);
            return false;
        };

        info!("run step {:?}: {}", step.name, step.command.join(" "));
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        match status {
            Ok(status) if status.success() => true,
            Ok(status) => {
                warn!("step {:?} exited with {status}", step.name);
                false
            }
            Err(error) => {
                warn!("step {:?} could not be started: {error}", step.name);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test_case(&["true"], true; "successful command")]
    #[test_case(&["false"], false; "failing command")]
    #[test_case(&["sh", "-c", "exit 3"], false; "command with arguments")]
    #[test_case(&["/nonexistent/snapkeeper/step"], false; "missing program")]
    #[test_case(&[], false; "empty command")]
    #[tokio::test]
    async fn step_outcome(command: &[&str], expect: bool) {
        let step = Step::new("check", command.iter().copied());
        assert_eq!(ShellCollaborator::new().run_step(&step).await, expect);
    }
}
