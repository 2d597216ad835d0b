//! Crawl executor.
//!
//! Invokes the external crawl tool (wget) once per URL, all URLs of a
//! job sharing a single temp workspace. URLs run sequentially in
//! insertion order; parallel invocations would race on shared asset
//! files (CSS/JS reused across pages) and make the crawl
//! non-deterministic.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use indexmap::IndexMap;
use url::Url;
use uuid::Uuid;

use crate::cmd::CmdBuilder;
use crate::config::MirrorConfig;
use crate::error::{MirrorError, Result};

/// An ephemeral, uniquely-named workspace for one crawl job.
///
/// The path is reserved but not created: the crawl tool creates it on
/// first capture, and its absence after an invocation is the failure
/// signal. On failure the directory is left behind for inspection.
#[derive(Debug, Clone)]
pub struct TempWorkspace {
    path: PathBuf,
}

impl TempWorkspace {
    /// A fresh workspace path under the system temp dir. The randomized
    /// suffix keeps overlapping invocations from colliding.
    pub fn unique() -> Self {
        Self {
            path: std::env::temp_dir().join(format!("static-mirror-{}", Uuid::new_v4().simple())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// One crawl-tool invocation for one URL.
#[derive(Debug, Clone)]
pub struct CrawlInvocation {
    pub url: Url,
    pub workspace: PathBuf,
    pub recursive: bool,
    pub user_agent: String,
    /// The crawl may span hosts for page requisites, but only into this
    /// allow-list: the URL's own host plus configured resource domains.
    pub allowed_domains: Vec<String>,
    pub cookie_header: String,
    pub reject_patterns: Vec<String>,
    pub no_check_certificate: bool,
}

impl CrawlInvocation {
    pub fn build(
        config: &MirrorConfig,
        url: &Url,
        workspace: &Path,
        recursive: bool,
    ) -> Self {
        let mut allowed_domains = config.resource_domains.clone();
        if let Some(host) = url.host_str() {
            allowed_domains.push(host.to_string());
        }
        Self {
            url: url.clone(),
            workspace: workspace.to_path_buf(),
            recursive,
            user_agent: config.user_agent.clone(),
            allowed_domains,
            cookie_header: config.cookie_header.clone(),
            reject_patterns: config.reject_patterns.clone(),
            no_check_certificate: config.no_check_certificate,
        }
    }

    /// Arguments for the crawl tool, program name excluded.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--user-agent={}", self.user_agent),
            // Never overwrite a file already captured in this run.
            "--no-clobber".to_string(),
            "--page-requisites".to_string(),
            // Rewrite links so the mirror browses standalone.
            "--convert-links".to_string(),
            "--backup-converted".to_string(),
        ];
        if self.recursive {
            args.push("--recursive".to_string());
        }
        args.extend([
            "-erobots=off".to_string(),
            "--restrict-file-names=windows".to_string(),
            format!("--reject-regex={}", self.reject_patterns.join("|")),
            "--html-extension".to_string(),
            "--content-on-error".to_string(),
            // Prevent duplicate files for redirected pages.
            "--trust-server-names".to_string(),
            format!("--header=Cookie: {}", self.cookie_header),
            "--span-hosts".to_string(),
            format!("--domains={}", self.allowed_domains.join(",")),
            format!("--directory-prefix={}", self.workspace.display()),
        ]);
        if self.no_check_certificate {
            args.push("--no-check-certificate".to_string());
        }
        args.push(self.url.to_string());
        args
    }
}

/// The external crawl tool boundary, as a trait so tests can substitute
/// a scripted implementation.
#[async_trait]
pub trait CrawlTool: Send + Sync {
    /// Verify the tool can be invoked at all. Runs before any
    /// filesystem state is created.
    fn check_available(&self) -> Result<()>;

    /// Crawl one URL into the invocation's workspace, returning the
    /// tool's combined output for diagnostics.
    async fn fetch(&self, invocation: &CrawlInvocation) -> Result<String>;
}

/// Production crawl tool: wget resolved from the environment.
pub struct WgetTool {
    binary: String,
}

impl WgetTool {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl CrawlTool for WgetTool {
    fn check_available(&self) -> Result<()> {
        which::which(&self.binary).map_err(|_| {
            MirrorError::DependencyUnavailable(format!("{} is not available", self.binary))
        })?;
        Ok(())
    }

    async fn fetch(&self, invocation: &CrawlInvocation) -> Result<String> {
        let cmd = CmdBuilder::new(&self.binary).args(invocation.args());
        tracing::debug!(command = %cmd.display(), "Invoking crawl tool");
        let output = cmd
            .run_capture()
            .await
            .map_err(|e| MirrorError::CrawlToolFailed {
                command: cmd.display(),
                output: e.to_string(),
            })?;
        Ok(output.text())
    }
}

/// Runs one job's URLs through the crawl tool into a shared workspace.
pub struct CrawlExecutor {
    config: MirrorConfig,
    tool: std::sync::Arc<dyn CrawlTool>,
}

impl CrawlExecutor {
    pub fn new(config: MirrorConfig, tool: std::sync::Arc<dyn CrawlTool>) -> Self {
        Self { config, tool }
    }

    /// Crawl every URL, in insertion order, into one fresh workspace.
    ///
    /// Fails fast with `DependencyUnavailable` before touching the
    /// filesystem. If the workspace is still missing after any URL's
    /// invocation the whole job fails; a half-crawled job is never
    /// promoted.
    pub async fn execute(
        &self,
        urls: &IndexMap<String, Url>,
        recursive: bool,
    ) -> Result<TempWorkspace> {
        self.tool.check_available()?;

        let workspace = TempWorkspace::unique();
        for url in urls.values() {
            let invocation =
                CrawlInvocation::build(&self.config, url, workspace.path(), recursive);
            tracing::info!(url = %url, recursive, workspace = %workspace.path().display(), "Crawling");

            let output = self.tool.fetch(&invocation).await?;

            // The tool reports per-file failures via exit code while still
            // mirroring; a missing workspace is the reliable failure sign.
            if !workspace.path().is_dir() {
                let command = CmdBuilder::new(&self.config.wget_binary)
                    .args(invocation.args())
                    .display();
                return Err(MirrorError::CrawlToolFailed { command, output });
            }
        }

        tracing::info!(
            urls = urls.len(),
            workspace = %workspace.path().display(),
            "Crawl completed"
        );
        Ok(workspace)
    }
}
