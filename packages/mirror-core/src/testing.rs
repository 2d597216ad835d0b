//! Testing utilities including mock implementations.
//!
//! These are useful for testing the scheduling and promotion pipeline
//! without a real wget binary or object-store backend.

use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::fs;

use crate::crawl::{CrawlInvocation, CrawlTool};
use crate::error::{MirrorError, Result};
use crate::object_store::ObjectStore;

/// A scripted crawl tool.
///
/// Simulates wget by writing a stock page per crawled URL (plus any
/// configured extra files) into the invocation's workspace. Failure
/// modes: reporting the binary as unavailable, or producing no output
/// at all (which the executor treats as a tool failure).
pub struct MockCrawlTool {
    available: bool,
    produce_output: bool,
    extra_files: Vec<(String, String)>,
    invocations: Arc<RwLock<Vec<CrawlInvocation>>>,
}

impl Default for MockCrawlTool {
    fn default() -> Self {
        Self {
            available: true,
            produce_output: true,
            extra_files: Vec::new(),
            invocations: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl MockCrawlTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tool whose binary cannot be resolved.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::default()
        }
    }

    /// A tool that runs but never creates the workspace.
    pub fn producing_nothing() -> Self {
        Self {
            produce_output: false,
            ..Self::default()
        }
    }

    /// Also write `content` at `relative` (to the workspace) on every
    /// fetch. Existing files are kept, mirroring wget's no-clobber.
    pub fn with_file(mut self, relative: impl Into<String>, content: impl Into<String>) -> Self {
        self.extra_files.push((relative.into(), content.into()));
        self
    }

    /// Invocations recorded so far, for assertions.
    pub fn invocations(&self) -> Vec<CrawlInvocation> {
        self.invocations.read().unwrap().clone()
    }
}

/// Workspace-relative capture path for a URL: `host/path/index.html`.
fn capture_path(invocation: &CrawlInvocation) -> String {
    let host = invocation.url.host_str().unwrap_or("unknown");
    let path = invocation.url.path().trim_matches('/');
    if path.is_empty() {
        format!("{host}/index.html")
    } else {
        format!("{host}/{path}/index.html")
    }
}

#[async_trait]
impl CrawlTool for MockCrawlTool {
    fn check_available(&self) -> Result<()> {
        if !self.available {
            return Err(MirrorError::DependencyUnavailable(
                "wget is not available".to_string(),
            ));
        }
        Ok(())
    }

    async fn fetch(&self, invocation: &CrawlInvocation) -> Result<String> {
        self.invocations.write().unwrap().push(invocation.clone());

        if !self.produce_output {
            return Ok("mock crawl produced nothing".to_string());
        }

        let page = invocation.workspace.join(capture_path(invocation));
        write_if_missing(&page, &format!("<html><body>mirrored {}</body></html>", invocation.url))
            .await?;

        for (relative, content) in &self.extra_files {
            write_if_missing(&invocation.workspace.join(relative), content).await?;
        }

        Ok("mock crawl ok".to_string())
    }
}

async fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    let scripted_failure = |e: std::io::Error| MirrorError::CrawlToolFailed {
        command: "mock".to_string(),
        output: e.to_string(),
    };
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(scripted_failure)?;
    }
    fs::write(path, content).await.map_err(scripted_failure)?;
    Ok(())
}

/// A recording object store with injectable failures.
pub struct MockObjectStore {
    supported: bool,
    fail_puts: bool,
    fail_deletes: bool,
    puts: RwLock<Vec<(String, Option<String>)>>,
    deleted_prefixes: RwLock<Vec<String>>,
}

impl Default for MockObjectStore {
    fn default() -> Self {
        Self {
            supported: true,
            fail_puts: false,
            fail_deletes: false,
            puts: RwLock::new(Vec::new()),
            deleted_prefixes: RwLock::new(Vec::new()),
        }
    }
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::default()
        }
    }

    pub fn failing_deletes() -> Self {
        Self {
            fail_deletes: true,
            ..Self::default()
        }
    }

    pub fn failing_puts() -> Self {
        Self {
            fail_puts: true,
            ..Self::default()
        }
    }

    /// Recorded `(relative, content_type)` writes.
    pub fn puts(&self) -> Vec<(String, Option<String>)> {
        self.puts.read().unwrap().clone()
    }

    pub fn deleted_prefixes(&self) -> Vec<String> {
        self.deleted_prefixes.read().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn put(&self, _local: &Path, relative: &str, content_type: Option<&str>) -> bool {
        if self.fail_puts {
            return false;
        }
        self.puts
            .write()
            .unwrap()
            .push((relative.to_string(), content_type.map(str::to_string)));
        true
    }

    async fn delete_prefix(&self, relative: &str) -> bool {
        if self.fail_deletes {
            return false;
        }
        self.deleted_prefixes
            .write()
            .unwrap()
            .push(relative.to_string());
        true
    }
}
