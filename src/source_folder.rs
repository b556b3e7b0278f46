//! A [`RemoteSource`] over a local directory mirror.
//!
//! Each top-level sub-directory of the root plays the role of a remote
//! folder; files nested deeper still belong to their top-level folder.
//! The remote id is the `/`-separated path relative to the root, the
//! fingerprint is the SHA-256 of the file bytes, and the modified time is
//! the file mtime in RFC 3339. Files directly under the root have an
//! empty folder name and are skipped by the planner.
//!
//! Moving a file between folders changes its path, so it appears as one
//! removal plus one addition.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use tiered_memory_core::sync::{RemoteFile, RemoteSource};

use crate::loader;

pub struct FolderSource {
    name: String,
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
}

impl FolderSource {
    pub fn new(
        name: &str,
        root: PathBuf,
        include_globs: &[String],
        exclude_globs: &[String],
    ) -> Result<Self> {
        let mut excludes = vec!["**/.git/**".to_string(), "**/.DS_Store".to_string()];
        excludes.extend(exclude_globs.iter().cloned());
        Ok(Self {
            name: name.to_string(),
            root,
            include: build_globset(include_globs)?,
            exclude: build_globset(&excludes)?,
        })
    }

    fn resolve(&self, remote_id: &str) -> Result<PathBuf> {
        let rel = Path::new(remote_id);
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("remote id escapes the sync root: {}", remote_id);
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl RemoteSource for FolderSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(&self) -> Result<Vec<RemoteFile>> {
        if !self.root.is_dir() {
            bail!("sync root does not exist: {}", self.root.display());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let rel_str = parts.join("/");

            if self.exclude.is_match(&rel_str) || !self.include.is_match(&rel_str) {
                continue;
            }

            let bytes = std::fs::read(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let modified_time = std::fs::metadata(path)
                .and_then(|m| m.modified())
                .ok()
                .map(|t| DateTime::<Utc>::from(t).to_rfc3339());

            let parent_folder = if parts.len() > 1 {
                parts[0].clone()
            } else {
                String::new()
            };
            let name = parts.last().cloned().unwrap_or_default();

            files.push(RemoteFile {
                remote_id: rel_str,
                name,
                fingerprint: format!("{:x}", Sha256::digest(&bytes)),
                modified_time,
                parent_folder,
            });
        }

        files.sort_by(|a, b| a.remote_id.cmp(&b.remote_id));
        Ok(files)
    }

    async fn fetch(&self, remote_id: &str) -> Result<String> {
        let path = self.resolve(remote_id)?;
        Ok(loader::load_file(&path)?)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}
