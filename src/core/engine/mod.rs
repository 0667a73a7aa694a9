use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::config::EngineConfig;
use crate::core::stream::RecordStream;

/// One message of the engine run protocol, emitted by the engine process as
/// a single JSON line on stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EngineMessage {
    /// First message of a run; carries the token that resumes this
    /// conversation in a later run.
    SystemInit { token: String },
    AssistantText { text: String },
    AssistantToolUse { name: String, input: Value },
    #[serde(rename_all = "camelCase")]
    UserToolResult {
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(rename_all = "camelCase")]
    RunResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cost: Option<f64>,
        #[serde(default)]
        duration_ms: u64,
    },
}

#[derive(Debug, Clone, Default)]
pub struct EngineRunOptions {
    /// Token from a previous run's `system-init`; resumes that conversation.
    pub continuation: Option<String>,
    pub system_prompt: Option<String>,
}

/// Ordered message stream of one run. Ends after the last message; a
/// failure is delivered as a final `Err` before the channel closes.
pub type EngineStream = mpsc::Receiver<Result<EngineMessage>>;

#[async_trait]
pub trait AgentEngine: Send + Sync {
    async fn start_run(&self, prompt: &str, opts: EngineRunOptions) -> Result<EngineStream>;
}

/// Engine backed by an external executable spawned once per run.
pub struct ProcessEngine {
    config: EngineConfig,
}

impl ProcessEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AgentEngine for ProcessEngine {
    async fn start_run(&self, prompt: &str, opts: EngineRunOptions) -> Result<EngineStream> {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args);
        if let Some(dir) = &self.config.workdir {
            cmd.current_dir(dir);
        }
        if let Some(token) = &opts.continuation {
            cmd.arg("--resume").arg(token);
        }
        if let Some(system_prompt) = &opts.system_prompt {
            cmd.arg("--system-prompt").arg(system_prompt);
        }
        cmd.arg(prompt);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn agent engine '{}'", self.config.command))?;
        let stdout = child
            .stdout
            .take()
            .context("agent engine stdout not captured")?;
        let mut stderr = child
            .stderr
            .take()
            .context("agent engine stderr not captured")?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let stderr_task = tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            });

            let mut records = RecordStream::new(stdout);
            let mut consumer_gone = false;
            loop {
                match records.next_record().await {
                    Ok(Some(record)) => match serde_json::from_str::<EngineMessage>(&record) {
                        Ok(message) => {
                            // Keep draining on a gone consumer so the child
                            // never blocks on a full stdout pipe.
                            if !consumer_gone && tx.send(Ok(message)).await.is_err() {
                                consumer_gone = true;
                            }
                        }
                        Err(_) => debug!("Skipping non-protocol engine output: {}", record),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(anyhow!("engine stdout read failed: {e}"))).await;
                        let _ = child.wait().await;
                        return;
                    }
                }
            }

            match child.wait().await {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    let detail = stderr_task.await.unwrap_or_default();
                    let detail = detail.trim();
                    let message = if detail.is_empty() {
                        format!("agent engine exited with {status}")
                    } else {
                        format!("agent engine exited with {status}: {detail}")
                    };
                    if !consumer_gone {
                        let _ = tx.send(Err(anyhow!(message))).await;
                    }
                }
                Err(e) => {
                    if !consumer_gone {
                        let _ = tx.send(Err(anyhow!("agent engine wait failed: {e}"))).await;
                    }
                }
            }
        });

        Ok(rx)
    }
}
