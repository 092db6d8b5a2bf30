use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use futures::FutureExt;
use futures::future::BoxFuture;
use log::{debug, info};
use serde::Serialize;

use crate::config::SyncConfig;
use crate::mask::RuleSet;
use crate::requests::PortalClient;
use crate::tree::{ChildNode, DirNode, RemoteFile, RemoteTree, child_path};

/// What a sync pass did, for the closing log line.
#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    pub downloaded: u64,
    pub recovered: u64,
    pub unchanged: u64,
    pub deprecated: u64,
    pub deleted: u64,
    pub conflicts_repaired: u64,
}

/// Diffs the scraped portal tree against the directory under the sync root.
///
/// New files are downloaded, files whose upstream counterpart vanished are
/// deprecated with the old-prefix (or deleted when `delete_old` is set),
/// and previously deprecated entries that reappear upstream are recovered
/// by renaming instead of re-downloading.
pub struct Mirror<'a> {
    config: &'a SyncConfig,
    rules: &'a RuleSet,
    client: &'a PortalClient,
    report: SyncReport,
}

impl<'a> Mirror<'a> {
    pub fn new(config: &'a SyncConfig, rules: &'a RuleSet, client: &'a PortalClient) -> Self {
        Self {
            config,
            rules,
            client,
            report: SyncReport::default(),
        }
    }

    pub async fn sync(mut self, tree: &RemoteTree) -> anyhow::Result<SyncReport> {
        tokio::fs::create_dir_all(&self.config.sync_root)
            .await
            .with_context(|| format!("creating {}", self.config.sync_root.display()))?;
        self.report.conflicts_repaired += self.repair_conflicts().await?;
        self.sync_dir(DirNode::Root(tree), PathBuf::new()).await?;
        self.report.conflicts_repaired += self.repair_conflicts().await?;
        Ok(self.report)
    }

    /// `fix_conflicts` walks the whole local tree with blocking fs calls,
    /// so it runs off the async runtime.
    async fn repair_conflicts(&self) -> anyhow::Result<u64> {
        let root = self.config.sync_root.clone();
        let suffix = self.config.conflict_suffix.clone();
        let prefix = self.config.old_prefix.clone();
        tokio::task::spawn_blocking(move || fix_conflicts(&root, &suffix, &prefix)).await?
    }

    /// Recursive descent. Returns whether any file below `dir` ended up on
    /// disk, which decides the fate of leftover sibling directories.
    fn sync_dir<'s>(
        &'s mut self,
        dir: DirNode<'s>,
        rel: PathBuf,
    ) -> BoxFuture<'s, anyhow::Result<bool>> {
        async move {
            let abs = self.config.sync_root.join(&rel);
            let mut existing_dirs: Vec<PathBuf> = Vec::new();
            let mut existing_files: Vec<PathBuf> = Vec::new();
            if tokio::fs::try_exists(&abs).await? {
                let mut entries = tokio::fs::read_dir(&abs).await?;
                while let Some(entry) = entries.next_entry().await? {
                    let name = entry.file_name().to_string_lossy().to_string();
                    if name.starts_with('.') {
                        continue;
                    }
                    let child_rel = undeprecate(&rel.join(&name), &self.config.old_prefix);
                    if entry.file_type().await?.is_dir() {
                        existing_dirs.push(child_rel);
                    } else {
                        existing_files.push(child_rel);
                    }
                }
            }

            let mut contains_files = false;
            for child in dir.children() {
                let child_rel = child_path(&rel, &child);
                match child {
                    ChildNode::File(file) => {
                        if self.rules.sync_file(&child_rel) {
                            self.ensure_downloaded(file, &child_rel).await?;
                            contains_files = true;
                            existing_files.retain(|p| p != &child_rel);
                        }
                    }
                    ChildNode::Dir(sub) => {
                        if self.rules.matches_any_root(&child_rel) {
                            let sub_contains = self.sync_dir(sub, child_rel.clone()).await?;
                            contains_files |= sub_contains;
                            if sub_contains {
                                existing_dirs.retain(|p| p != &child_rel);
                            }
                        }
                    }
                }
            }

            // Leftovers directly under the sync root stay put; that's where
            // mask.txt and friends live.
            if !rel.as_os_str().is_empty() {
                for leftover in existing_dirs {
                    self.retire(&leftover).await?;
                }
                for leftover in existing_files {
                    self.retire(&leftover).await?;
                }
            }
            Ok(contains_files)
        }
        .boxed()
    }

    /// Make sure a wanted file is on disk: keep it, recover its deprecated
    /// twin, or download it.
    async fn ensure_downloaded(&mut self, file: &RemoteFile, rel: &Path) -> anyhow::Result<()> {
        self.touchdir(rel.parent().unwrap_or_else(|| Path::new(""))).await?;
        let abs = self.config.sync_root.join(rel);
        let deprecated_abs = deprecate(&abs, &self.config.old_prefix);
        if tokio::fs::try_exists(&abs).await? {
            debug!("[~] {}", rel.display());
            self.report.unchanged += 1;
        } else if tokio::fs::try_exists(&deprecated_abs).await? {
            info!("[+] {} (recovered)", rel.display());
            tokio::fs::rename(&deprecated_abs, &abs).await?;
            self.report.recovered += 1;
        } else {
            info!("[+] {}", rel.display());
            let staging = staging_path(&abs);
            if let Err(e) = self.client.download_to(&file.url, &staging).await {
                // A half-written staging file must not survive into the
                // next run, where it would get deprecated like a real one.
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(e.context(format!("downloading {}", rel.display())));
            }
            tokio::fs::rename(&staging, &abs).await?;
            self.report.downloaded += 1;
        }
        Ok(())
    }

    /// A local entry with no upstream counterpart: deprecate it, or delete
    /// it when configured to.
    async fn retire(&mut self, rel: &Path) -> anyhow::Result<()> {
        let abs = self.config.sync_root.join(rel);
        let deprecated_abs = deprecate(&abs, &self.config.old_prefix);
        if self.config.delete_old {
            let target = if tokio::fs::try_exists(&deprecated_abs).await? {
                &deprecated_abs
            } else {
                &abs
            };
            match tokio::fs::metadata(target).await {
                Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(target).await?,
                Ok(_) => tokio::fs::remove_file(target).await?,
                Err(_) => return Ok(()),
            }
            info!("[-] {}", rel.display());
            self.report.deleted += 1;
        } else if tokio::fs::try_exists(&deprecated_abs).await? {
            // Deprecated in an earlier run, nothing left to do.
            debug!("[x] {}", rel.display());
        } else if tokio::fs::try_exists(&abs).await? {
            info!("[x] {}", rel.display());
            tokio::fs::rename(&abs, &deprecated_abs).await?;
            self.report.deprecated += 1;
        }
        Ok(())
    }

    /// Create the directory chain under the sync root, recovering
    /// deprecated ancestors instead of creating duplicates next to them.
    async fn touchdir(&self, rel: &Path) -> anyhow::Result<()> {
        let mut path = self.config.sync_root.clone();
        for part in rel.components() {
            path.push(part);
            if tokio::fs::try_exists(&path).await? {
                continue;
            }
            let deprecated = deprecate(&path, &self.config.old_prefix);
            if tokio::fs::try_exists(&deprecated).await? {
                tokio::fs::rename(&deprecated, &path).await?;
            } else {
                tokio::fs::create_dir(&path)
                    .await
                    .with_context(|| format!("creating {}", path.display()))?;
            }
        }
        Ok(())
    }
}

/// Walk the local tree renaming entries that carry the sync-conflict
/// suffix some cloud clients append, dropping the old-prefix in the same
/// rename. Returns the number of repairs.
pub fn fix_conflicts(root: &Path, conflict_suffix: &str, old_prefix: &str) -> anyhow::Result<u64> {
    if !root.exists() {
        return Ok(0);
    }
    let mut repaired = 0;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        let mut path = entry.path();
        if name.contains(conflict_suffix) {
            let fixed = root.join(name.replace(conflict_suffix, "").replace(old_prefix, ""));
            info!("[x] {} -> {}", path.display(), fixed.display());
            fs::rename(&path, &fixed)?;
            repaired += 1;
            path = fixed;
        }
        if path.is_dir() {
            repaired += fix_conflicts(&path, conflict_suffix, old_prefix)?;
        }
    }
    Ok(repaired)
}

fn entry_name(path: &Path) -> String {
    path.file_name().unwrap_or_default().to_string_lossy().to_string()
}

/// `Algebra/notes.pdf` → `Algebra/(OLD) notes.pdf`.
pub fn deprecate(path: &Path, old_prefix: &str) -> PathBuf {
    let name = entry_name(path);
    if name.starts_with(old_prefix) {
        path.to_path_buf()
    } else {
        path.with_file_name(format!("{old_prefix}{name}"))
    }
}

/// The inverse of `deprecate`; a no-op for unprefixed names.
pub fn undeprecate(path: &Path, old_prefix: &str) -> PathBuf {
    let name = entry_name(path);
    match name.strip_prefix(old_prefix) {
        Some(stripped) => path.with_file_name(stripped.to_string()),
        None => path.to_path_buf(),
    }
}

fn staging_path(abs: &Path) -> PathBuf {
    abs.with_file_name(format!("{}.part", entry_name(abs)))
}
