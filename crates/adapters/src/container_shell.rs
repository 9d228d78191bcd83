// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatches a shell command string into an architecture-specific
//! container, verifying the child actually ran to completion.

use std::path::{Path, PathBuf};

use packhouse_core::Arch;
use thiserror::Error;

use crate::supervisor::{self, SupervisorConfig, SupervisorError, SupervisorOutput};

/// The sentinel the trap must print as the very last line on any exit path.
const EXIT_SENTINEL: &str = "++ exit 0\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchClass {
    X86,
    Arm,
}

impl ArchClass {
    pub fn classify(arch: &Arch) -> Option<Self> {
        match arch.as_str() {
            "x86_64" | "x86" | "x64" => Some(ArchClass::X86),
            "aarch64" | "arm64" => Some(ArchClass::Arm),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ContainerShellError {
    #[error("arch {0:?} has no configured container invocation")]
    UnknownArch(Arch),
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error("container command did not end with the exit sentinel; tail: {tail}")]
    MissingSentinel { tail: String },
}

/// The fixed argv prefix used to enter each arch class's container. The
/// caller-built command string is appended as the final argument.
#[derive(Debug, Clone)]
pub struct ContainerShell {
    container_root: PathBuf,
    x86_invocation: Vec<String>,
    arm_invocation: Vec<String>,
    arm_preamble: Option<String>,
}

impl ContainerShell {
    pub fn new(
        container_root: PathBuf,
        x86_invocation: Vec<String>,
        arm_invocation: Vec<String>,
    ) -> Self {
        Self {
            container_root,
            x86_invocation,
            arm_invocation,
            arm_preamble: None,
        }
    }

    /// Extra shell fragment run before the trap on arm-class containers,
    /// e.g. environment setup that only the arm host needs.
    pub fn with_arm_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.arm_preamble = Some(preamble.into());
        self
    }

    fn invocation_for(&self, class: ArchClass) -> &[String] {
        match class {
            ArchClass::X86 => &self.x86_invocation,
            ArchClass::Arm => &self.arm_invocation,
        }
    }

    fn build_command(&self, class: ArchClass, cwd: Option<&str>, cmdline: &str) -> String {
        let target = match cwd {
            Some(rel) => self.container_root.join(rel),
            None => self.container_root.clone(),
        };
        let trap = "trap 'echo \"++ exit $?\"' EXIT";
        let preamble = match class {
            ArchClass::Arm => self.arm_preamble.as_deref().unwrap_or(""),
            ArchClass::X86 => "",
        };
        format!(
            "{preamble}{sep}{trap}; cd '{cwd}'; {cmdline}",
            preamble = preamble,
            sep = if preamble.is_empty() { "" } else { "; " },
            trap = trap,
            cwd = target.display(),
            cmdline = cmdline,
        )
    }

    /// Run `cmdline` inside the container mapped to `arch`, under
    /// `cwd` (relative to the configured container root).
    pub async fn run(
        &self,
        arch: &Arch,
        cwd: Option<&str>,
        cmdline: &str,
        argv_label: &str,
        config: SupervisorConfig,
    ) -> Result<SupervisorOutput, ContainerShellError> {
        let class =
            ArchClass::classify(arch).ok_or_else(|| ContainerShellError::UnknownArch(arch.clone()))?;
        let command = self.build_command(class, cwd, cmdline);
        let mut argv = self.invocation_for(class).to_vec();
        argv.push(command);

        let mut cmd = tokio::process::Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        let labeled_argv = vec![argv_label.to_string()];

        // The sentinel, not the wrapper tool's own exit status, is the
        // source of truth: some container tool wrappers report success
        // even when the inner command failed, or swallow the real status
        // entirely. So a nonzero-looking `CommandFailed` is reinterpreted
        // as success if the tail still carries the sentinel, and a clean
        // exit is downgraded to failure if it doesn't.
        match supervisor::run(cmd, labeled_argv, config).await {
            Ok(out) if out.tail.ends_with(EXIT_SENTINEL) => Ok(out),
            Ok(out) => Err(ContainerShellError::MissingSentinel { tail: out.tail }),
            Err(SupervisorError::CommandFailed { tail, .. }) if tail.ends_with(EXIT_SENTINEL) => {
                Ok(SupervisorOutput {
                    status: Some(0),
                    tail,
                })
            }
            Err(SupervisorError::CommandFailed { tail, .. }) => {
                Err(ContainerShellError::MissingSentinel { tail })
            }
            Err(other) => Err(other.into()),
        }
    }

    pub fn container_root(&self) -> &Path {
        &self.container_root
    }
}

#[cfg(test)]
#[path = "container_shell_tests.rs"]
mod tests;
