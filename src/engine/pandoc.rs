//! External `pandoc` process engine.
//!
//! Each call spawns `pandoc --from <src> --to <dst> --wrap=none`, feeds the
//! markup on stdin and reads AsciiDoc from stdout. The child is spawned with
//! `kill_on_drop`, so when the adapter's timeout drops the future the
//! process dies with it.

use super::{ConversionEngine, Dialect, EngineError};
use crate::error::{ConversionEngineError, EngineUnavailable};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

const ENGINE_NAME: &str = "pandoc";

/// Runs a local `pandoc` binary.
#[derive(Debug, Clone)]
pub struct PandocEngine {
    binary: String,
    /// Writer used when the target is AsciiDoc (`asciidoc`, `asciidoctor`, …).
    asciidoc_format: String,
}

impl PandocEngine {
    pub fn new(binary: impl Into<String>, asciidoc_format: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            asciidoc_format: asciidoc_format.into(),
        }
    }

    fn format_name(&self, dialect: Dialect) -> &str {
        match dialect {
            Dialect::AsciiDoc => &self.asciidoc_format,
            other => other.pandoc_name(),
        }
    }

    fn args(&self, from: Dialect, to: Dialect) -> Vec<String> {
        vec![
            "--from".to_string(),
            self.format_name(from).to_string(),
            "--to".to_string(),
            self.format_name(to).to_string(),
            "--wrap=none".to_string(),
        ]
    }

    fn unavailable(&self, reason: impl Into<String>) -> EngineUnavailable {
        EngineUnavailable {
            engine: ENGINE_NAME.to_string(),
            reason: reason.into(),
        }
    }

    fn failed(detail: impl Into<String>) -> EngineError {
        EngineError::Failed(ConversionEngineError {
            engine: ENGINE_NAME.to_string(),
            detail: detail.into(),
        })
    }

    /// Spawn errors that mean the binary cannot run at all.
    fn spawn_error(&self, e: std::io::Error) -> EngineError {
        match e.kind() {
            ErrorKind::NotFound => self
                .unavailable(format!("'{}' not found on PATH", self.binary))
                .into(),
            ErrorKind::PermissionDenied => self
                .unavailable(format!("'{}' is not executable", self.binary))
                .into(),
            _ => Self::failed(format!("failed to spawn '{}': {e}", self.binary)),
        }
    }
}

impl Default for PandocEngine {
    fn default() -> Self {
        Self::new("pandoc", "asciidoc")
    }
}

#[async_trait]
impl ConversionEngine for PandocEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    async fn probe(&self) -> Result<(), EngineUnavailable> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.unavailable(format!("cannot run '{}': {e}", self.binary)))?;

        if !output.status.success() {
            return Err(self.unavailable(format!(
                "'{} --version' exited with {}",
                self.binary, output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(version = stdout.lines().next().unwrap_or(""), "pandoc available");
        Ok(())
    }

    async fn convert(
        &self,
        input: &str,
        from: Dialect,
        to: Dialect,
    ) -> Result<String, EngineError> {
        let mut child = Command::new(&self.binary)
            .args(self.args(from, to))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Self::failed("child stdin was not captured"))?;

        // Feed stdin concurrently so a large page cannot deadlock on a full
        // stdout pipe.
        let input = input.to_owned();
        let writer = tokio::spawn(async move {
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Self::failed(format!("waiting for pandoc failed: {e}")))?;

        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.kind() == ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => return Err(Self::failed(format!("writing to pandoc failed: {e}"))),
            Err(e) => return Err(Self::failed(format!("stdin task failed: {e}"))),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Self::failed(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| Self::failed(format!("output is not valid UTF-8: {e}")))
    }
}
