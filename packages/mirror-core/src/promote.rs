//! Artifact promoter.
//!
//! Relocates a finished temp workspace into permanent, timestamped
//! storage and synthesizes the index document. Source files are removed
//! as they are successfully copied, so a failure mid-move leaves a
//! partial but inspectable trail rather than silently losing files.
//! Persisting the catalog row is a separate step: a crash between the
//! two leaves files with no row, which is detectable, never
//! double-recorded.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::fs;
use url::Url;

use crate::error::{PromoteError, PromoteResult};
use crate::object_store::ObjectStore;
use crate::types::{ChangelogEntry, MirrorArtifact, MirrorId, MirrorStatus};

pub struct Promoter {
    object_store: Option<Arc<dyn ObjectStore>>,
}

impl Promoter {
    pub fn new(object_store: Option<Arc<dyn ObjectStore>>) -> Self {
        Self { object_store }
    }

    fn object_store(&self) -> Option<&Arc<dyn ObjectStore>> {
        self.object_store.as_ref().filter(|s| s.is_supported())
    }

    /// Move the workspace into `destination`, write the index document,
    /// and return the artifact candidate for the catalog to persist.
    pub async fn promote<'a>(
        &self,
        workspace: &Path,
        destination: &Path,
        destination_relative: &str,
        urls: impl IntoIterator<Item = &'a Url>,
        changelog: &[ChangelogEntry],
        started_at: DateTime<Utc>,
    ) -> PromoteResult<MirrorArtifact> {
        let moved = self
            .move_tree(workspace, destination, destination_relative)
            .await?;

        let ended_at = Utc::now();
        let index = render_index(urls, changelog, ended_at);
        self.write_index(destination, destination_relative, &index)
            .await?;

        tracing::info!(
            destination = %destination.display(),
            files = moved,
            "Promoted workspace into permanent storage"
        );

        Ok(MirrorArtifact {
            id: MirrorId::new(),
            created_at: ended_at,
            started_at,
            ended_at,
            status: MirrorStatus::Private,
            storage_dir: destination.to_path_buf(),
            storage_dir_relative: destination_relative.to_string(),
            changelog: changelog.to_vec(),
        })
    }

    /// Move every file under `workspace` into the destination,
    /// preserving structure. Returns the number of files moved.
    async fn move_tree(
        &self,
        workspace: &Path,
        destination: &Path,
        destination_relative: &str,
    ) -> PromoteResult<usize> {
        let mut pending = vec![workspace.to_path_buf()];
        let mut visited = Vec::new();
        let mut moved = 0usize;

        while let Some(dir) = pending.pop() {
            visited.push(dir.clone());
            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| PromoteError::io("read", &dir, e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| PromoteError::io("read", &dir, e))?
            {
                let source = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| PromoteError::io("stat", &source, e))?;
                if file_type.is_dir() {
                    pending.push(source);
                    continue;
                }

                let relative = source
                    .strip_prefix(workspace)
                    .expect("entry is under the workspace root")
                    .to_path_buf();
                self.place_file(&source, destination, destination_relative, &relative)
                    .await?;
                fs::remove_file(&source)
                    .await
                    .map_err(|e| PromoteError::io("remove", &source, e))?;
                moved += 1;
            }
        }

        // Emptied source directories, deepest first. Best effort only:
        // a straggler left by a failed earlier run must not fail the move.
        visited.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
        for dir in visited {
            let _ = fs::remove_dir(&dir).await;
        }

        Ok(moved)
    }

    /// Write one file into the destination, via the object store when
    /// one backs it, or a plain filesystem copy otherwise.
    async fn place_file(
        &self,
        source: &Path,
        destination: &Path,
        destination_relative: &str,
        relative: &Path,
    ) -> PromoteResult<()> {
        if let Some(store) = self.object_store() {
            // The crawl tool does not reliably produce typed paths;
            // HTML documents get their content type set explicitly.
            let content_type = is_html(source)
                .then(|| mime_guess::from_path(source).first_raw())
                .flatten();
            let key = object_key(destination_relative, relative);
            if !store.put(source, &key, content_type).await {
                return Err(PromoteError::ObjectStore {
                    path: source.to_path_buf(),
                });
            }
            return Ok(());
        }

        let dest = destination.join(relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PromoteError::io("create", parent, e))?;
        }
        fs::copy(source, &dest)
            .await
            .map_err(|e| PromoteError::io("copy", &dest, e))?;
        Ok(())
    }

    async fn write_index(
        &self,
        destination: &Path,
        destination_relative: &str,
        html: &str,
    ) -> PromoteResult<()> {
        if let Some(store) = self.object_store() {
            let staged = std::env::temp_dir().join(format!("static-mirror-index-{}", MirrorId::new()));
            fs::write(&staged, html)
                .await
                .map_err(|e| PromoteError::io("write", &staged, e))?;
            let key = object_key(destination_relative, Path::new("index.html"));
            let ok = store.put(&staged, &key, Some("text/html")).await;
            let _ = fs::remove_file(&staged).await;
            if !ok {
                return Err(PromoteError::ObjectStore { path: staged });
            }
            return Ok(());
        }

        fs::create_dir_all(destination)
            .await
            .map_err(|e| PromoteError::io("create", destination, e))?;
        let index_path = destination.join("index.html");
        fs::write(&index_path, html)
            .await
            .map_err(|e| PromoteError::io("write", &index_path, e))?;
        Ok(())
    }
}

fn is_html(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "html")
}

fn object_key(destination_relative: &str, relative: &Path) -> String {
    format!(
        "{}/{}",
        destination_relative.trim_matches('/'),
        relative.display()
    )
}

/// The human-facing "what's in this snapshot and why" document: each
/// crawled base as a relative link into its captured path, then the
/// full changelog.
fn render_index<'a>(
    urls: impl IntoIterator<Item = &'a Url>,
    changelog: &[ChangelogEntry],
    generated_at: DateTime<Utc>,
) -> String {
    let mut sites = String::new();
    for url in urls {
        let mut target = url.host_str().unwrap_or_default().to_string();
        let path = url.path().trim_end_matches('/');
        target.push_str(path);
        sites.push_str(&format!(
            "\t\t\t<li><a href=\"{0}/index.html\">{0}</a></li>\n",
            escape_html(&target),
        ));
    }

    let mut changes = String::new();
    for change in changelog {
        changes.push_str(&format!(
            "\t\t\t<li>{} - {}</li>\n",
            change.date.to_rfc3339_opts(SecondsFormat::Secs, true),
            escape_html(&change.text),
        ));
    }

    format!(
        "<!DOCTYPE html>\n<html>\n\t<head>\n\t\t<title>Static Mirror: {generated}</title>\n\t</head>\n\t<body>\n\t\t<h4>Sites</h4>\n\t\t<ul>\n{sites}\t\t</ul>\n\t\t<hr />\n\t\t<h4>Changelog</h4>\n\t\t<ul>\n{changes}\t\t</ul>\n\t</body>\n</html>\n",
        generated = generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Timestamp-partitioned storage path, relative to the storage root:
/// `/mirrors/YYYY/MM/D/HH-MM-SS` (day without a leading zero).
pub fn destination_relative(started_at: DateTime<Utc>) -> String {
    started_at.format("/mirrors/%Y/%m/%-d/%H-%M-%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_destination_relative_format() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(destination_relative(ts), "/mirrors/2024/05/1/12-00-00");
    }

    #[test]
    fn test_render_index_lists_sites_and_changelog() {
        let urls = [
            Url::parse("https://example.com/x/").unwrap(),
            Url::parse("https://other.example.org/").unwrap(),
        ];
        let changelog = vec![ChangelogEntry::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 11, 58, 0).unwrap(),
            "Post <X> published",
        )];
        let html = render_index(
            urls.iter(),
            &changelog,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        );

        assert!(html.contains("<a href=\"example.com/x/index.html\">example.com/x</a>"));
        assert!(html.contains("<a href=\"other.example.org/index.html\">other.example.org</a>"));
        assert!(html.contains("2024-05-01T11:58:00Z - Post &lt;X&gt; published"));
    }

    #[tokio::test]
    async fn test_move_tree_relocates_and_empties_workspace() {
        let scratch = tempfile::tempdir().unwrap();
        let workspace = scratch.path().join("workspace");
        let destination = scratch.path().join("mirrors/2024/05/1/12-00-00");

        tokio::fs::create_dir_all(workspace.join("example.com/assets"))
            .await
            .unwrap();
        tokio::fs::write(workspace.join("example.com/index.html"), "<html></html>")
            .await
            .unwrap();
        tokio::fs::write(workspace.join("example.com/assets/site.css"), "body{}")
            .await
            .unwrap();

        let promoter = Promoter::new(None);
        let moved = promoter
            .move_tree(&workspace, &destination, "/mirrors/2024/05/1/12-00-00")
            .await
            .unwrap();

        assert_eq!(moved, 2);
        assert!(destination.join("example.com/index.html").is_file());
        assert!(destination.join("example.com/assets/site.css").is_file());
        // The move empties and removes the workspace.
        assert!(!workspace.exists());
    }
}
