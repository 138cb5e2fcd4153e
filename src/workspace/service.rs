//! Workspace file operations over in-container exec.
//!
//! Every operation shells out to the busybox/coreutils tools inside the
//! sandbox (`ls`, `cat`, `mkdir`, `base64`, `rm`) because the container's
//! rootfs is read-only and archive transfer cannot be relied on. Paths are
//! expected to be pre-sanitized (see [`crate::workspace::path`]).

use crate::container::{ExecSpec, Runtime};
use crate::error::{Error, Result};
use crate::workspace::path::{WORKSPACE_ROOT, container_path};
use base64::Engine;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Raw chunk size for writes. Each chunk is base64-encoded into a shell
/// argument, and exec argv length is bounded; 24 KiB raw stays ~32 KiB
/// encoded.
const WRITE_CHUNK_RAW: usize = 24 * 1024;

/// Directory entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

/// One directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

/// Content encoding of a read result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Utf8,
    Base64,
}

/// A file read back from the workspace.
#[derive(Debug, Clone, Serialize)]
pub struct FileContent {
    pub content: String,
    pub encoding: Encoding,
}

/// File operations against a running sandbox's `/workspace`.
#[derive(Clone)]
pub struct WorkspaceService {
    runtime: Arc<dyn Runtime>,
}

impl WorkspaceService {
    pub fn new(runtime: Arc<dyn Runtime>) -> Self {
        Self { runtime }
    }

    /// List entries at a workspace-relative path, sorted by
    /// (lowercased name, kind).
    pub async fn list(&self, container_id: &str, relative: &str) -> Result<Vec<Entry>> {
        let target = container_path(relative);
        let spec = ExecSpec::argv(["ls", "-1p", target.as_str()]).workdir(WORKSPACE_ROOT);
        let output = self.runtime.exec(container_id, &spec).await?;

        if !output.success() {
            let err = merged_error(&output.stdout, &output.stderr);
            if is_not_found(&err) {
                return Err(Error::PathNotFound);
            }
            return Err(Error::Internal(non_empty(err, "list failed")));
        }

        Ok(parse_listing(&output.stdout_lossy()))
    }

    /// Read a file. UTF-8 content comes back as-is; binary content is
    /// base64-encoded and flagged.
    pub async fn read(
        &self,
        container_id: &str,
        relative: &str,
        max_size: u64,
    ) -> Result<FileContent> {
        let target = container_path(relative);
        let spec = ExecSpec::argv(["cat", target.as_str()]).workdir(WORKSPACE_ROOT);
        let output = self.runtime.exec(container_id, &spec).await?;

        if !output.success() {
            let err = merged_error(&output.stdout, &output.stderr);
            if is_not_found(&err) {
                return Err(Error::PathNotFound);
            }
            if err.to_lowercase().contains("directory") {
                return Err(Error::PathIsDirectory);
            }
            return Err(Error::Internal(non_empty(err, "read failed")));
        }

        let data = output.stdout;
        if max_size > 0 && data.len() as u64 > max_size {
            return Err(Error::FileTooLarge { limit: max_size });
        }

        match String::from_utf8(data) {
            Ok(text) => Ok(FileContent {
                content: text,
                encoding: Encoding::Utf8,
            }),
            Err(err) => Ok(FileContent {
                content: base64::engine::general_purpose::STANDARD.encode(err.as_bytes()),
                encoding: Encoding::Base64,
            }),
        }
    }

    /// Write a file, creating parent directories. The payload is moved in
    /// base64 chunks: the first truncates the target, the rest append.
    pub async fn write(
        &self,
        container_id: &str,
        relative: &str,
        content: &[u8],
        max_size: u64,
    ) -> Result<()> {
        if max_size > 0 && content.len() as u64 > max_size {
            return Err(Error::FileTooLarge { limit: max_size });
        }

        let target = container_path(relative);

        if let Some((parent, _)) = relative.rsplit_once('/') {
            let parent_abs = container_path(parent);
            let spec =
                ExecSpec::argv(["mkdir", "-p", parent_abs.as_str()]).workdir(WORKSPACE_ROOT);
            let output = self.runtime.exec(container_id, &spec).await?;
            if !output.success() {
                return Err(Error::Internal(non_empty(
                    merged_error(&output.stdout, &output.stderr),
                    "mkdir failed",
                )));
            }
        }

        if content.is_empty() {
            let spec = ExecSpec::argv(["touch", target.as_str()]).workdir(WORKSPACE_ROOT);
            let output = self.runtime.exec(container_id, &spec).await?;
            if !output.success() {
                return Err(Error::Internal(non_empty(
                    merged_error(&output.stdout, &output.stderr),
                    "touch failed",
                )));
            }
            return Ok(());
        }

        for (index, chunk) in content.chunks(WRITE_CHUNK_RAW).enumerate() {
            let encoded = base64::engine::general_purpose::STANDARD.encode(chunk);
            let redirect = if index == 0 { ">" } else { ">>" };
            let command = format!("echo '{encoded}' | base64 -d {redirect} '{target}'");
            let spec = ExecSpec::shell(&command).workdir(WORKSPACE_ROOT);
            let output = self.runtime.exec(container_id, &spec).await?;
            if !output.success() {
                return Err(Error::Internal(non_empty(
                    merged_error(&output.stdout, &output.stderr),
                    "write failed",
                )));
            }
        }

        debug!(
            "Wrote {} bytes to {} in container {}",
            content.len(),
            target,
            container_id
        );
        Ok(())
    }

    /// Delete a file or directory. Deleting the workspace root is refused.
    pub async fn delete(&self, container_id: &str, relative: &str) -> Result<()> {
        if relative.is_empty() {
            return Err(Error::BadPath);
        }
        let target = container_path(relative);

        let spec = ExecSpec::argv(["rm", "-rf", target.as_str()]).workdir(WORKSPACE_ROOT);
        let output = self.runtime.exec(container_id, &spec).await?;
        if !output.success() {
            let err = merged_error(&output.stdout, &output.stderr);
            if is_not_found(&err) {
                return Err(Error::PathNotFound);
            }
            return Err(Error::Internal(non_empty(err, "delete failed")));
        }
        Ok(())
    }
}

/// Parse `ls -1p` output: a trailing slash marks a directory.
fn parse_listing(output: &str) -> Vec<Entry> {
    let mut entries: Vec<Entry> = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line.strip_suffix('/') {
            Some(name) => Entry {
                name: name.to_string(),
                kind: EntryKind::Dir,
            },
            None => Entry {
                name: line.to_string(),
                kind: EntryKind::File,
            },
        })
        .collect();
    entries.sort_by(|a, b| {
        (a.name.to_lowercase(), a.kind as u8).cmp(&(b.name.to_lowercase(), b.kind as u8))
    });
    entries
}

fn merged_error(stdout: &[u8], stderr: &[u8]) -> String {
    if stderr.is_empty() {
        String::from_utf8_lossy(stdout).into_owned()
    } else {
        String::from_utf8_lossy(stderr).into_owned()
    }
}

fn is_not_found(err: &str) -> bool {
    let lower = err.to_lowercase();
    err.contains("No such file") || lower.contains("not found") || lower.contains("cannot open")
}

fn non_empty(err: String, fallback: &str) -> String {
    let trimmed = err.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}
