// src/exec/interpreter.rs

//! Processors that write the code to a file and hand it to an interpreter.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::{bail, Context};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::workflow::ProcessSpec;

use super::processor::{ProcessExit, Processor, RunContext};

#[derive(Debug, Clone)]
pub struct InterpreterProcessor {
    name: String,
    program: String,
    args: Vec<String>,
}

impl InterpreterProcessor {
    pub fn new(name: &str, program: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    async fn execute(&self, spec: &ProcessSpec, mut ctx: RunContext) -> anyhow::Result<ProcessExit> {
        for path in [&ctx.script_path, &ctx.stdout_path, &ctx.stderr_path] {
            if let Some(dir) = path.parent() {
                tokio::fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("creating {}", dir.display()))?;
            }
        }
        tokio::fs::write(&ctx.script_path, spec.code.as_bytes())
            .await
            .with_context(|| format!("writing code of process '{}'", spec.id))?;

        let stdout = std::fs::File::create(&ctx.stdout_path)
            .with_context(|| format!("creating {}", ctx.stdout_path.display()))?;
        let stderr = std::fs::File::create(&ctx.stderr_path)
            .with_context(|| format!("creating {}", ctx.stderr_path.display()))?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(&ctx.script_path)
            .current_dir(&ctx.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);
        // Own process group, so an interrupt can take the children down too.
        #[cfg(unix)]
        cmd.process_group(0);

        info!(process = %spec.id, program = %self.program, "starting process");

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning {} for process '{}'", self.program, spec.id))?;
        let pid = child.id();

        tokio::select! {
            status = child.wait() => {
                let status = status
                    .with_context(|| format!("waiting for process '{}'", spec.id))?;
                debug!(process = %spec.id, exit_code = ?status.code(), "process exited");
                Ok(ProcessExit::Exited(status.code()))
            }
            _ = ctx.cancel.cancelled() => {
                info!(process = %spec.id, "interrupt requested; killing process");
                if let Some(pid) = pid {
                    kill_process_group(pid).await;
                }
                if let Err(err) = child.kill().await {
                    warn!(process = %spec.id, error = %err, "failed to kill process");
                }
                Ok(ProcessExit::Cancelled)
            }
        }
    }
}

impl Processor for InterpreterProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn static_check(&self, spec: &ProcessSpec) -> anyhow::Result<()> {
        if spec.code.trim().is_empty() {
            bail!("{} process has no code to run", self.name);
        }
        Ok(())
    }

    fn run<'a>(
        &'a self,
        spec: &'a ProcessSpec,
        ctx: RunContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ProcessExit>> + Send + 'a>> {
        Box::pin(self.execute(spec, ctx))
    }
}

#[cfg(unix)]
async fn kill_process_group(pid: u32) {
    let group = format!("-{pid}");
    match Command::new("kill")
        .args(["-KILL", "--", &group])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        Ok(status) if status.success() => debug!(pid, "process group killed"),
        Ok(status) => debug!(pid, code = ?status.code(), "kill returned non-zero"),
        Err(err) => warn!(pid, error = %err, "failed to run kill"),
    }
}

#[cfg(not(unix))]
async fn kill_process_group(_pid: u32) {}
