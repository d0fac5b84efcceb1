//! File ingestion: files → text → chunks → document store.
//!
//! Each file becomes one document keyed by its file name (not its full
//! path), the same name the user later passes to `docs delete`.
//! Directories are walked recursively; files inside them with an
//! unsupported extension are skipped. A file that fails (unreadable,
//! unsupported when named explicitly, or already stored) is reported and
//! the rest of the batch carries on. Files added before a failure stay
//! added.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use docchat_core::chunk::chunk_document;
use docchat_core::models::Chunk;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::ChunkingConfig;
use crate::documents::DocumentStore;
use crate::extract::{content_type_for, extract_text};

/// What happened to one input file.
#[derive(Debug)]
pub enum FileOutcome {
    Added { name: String, chunks: usize },
    Failed { path: PathBuf, error: anyhow::Error },
}

/// Result of an [`add_files`] batch, in processing order.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub outcomes: Vec<FileOutcome>,
}

impl IngestReport {
    pub fn added(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, FileOutcome::Added { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.added()
    }
}

/// Expand `inputs` into the list of files to ingest.
///
/// Explicit files are kept whatever their extension (so an unsupported
/// one is reported). Directory contents are filtered to supported types
/// and sorted for a deterministic order.
pub fn collect_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found = Vec::new();
            for entry in WalkDir::new(input) {
                let entry =
                    entry.with_context(|| format!("Failed to walk {}", input.display()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                if content_type_for(entry.path()).is_none() {
                    warn!(path = %entry.path().display(), "skipping unsupported file");
                    continue;
                }
                found.push(entry.into_path());
            }
            found.sort();
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

/// Document name for `path`: its file name.
pub fn document_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("Path has no file name: {}", path.display()))
}

/// Read `path` and split it into chunks owned by document `name`.
pub fn load_chunks(path: &Path, name: &str, chunking: &ChunkingConfig) -> Result<Vec<Chunk>> {
    let content_type = content_type_for(path)
        .ok_or_else(|| anyhow!("Unsupported file type: {}", path.display()))?;
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let text = extract_text(&bytes, content_type)
        .with_context(|| format!("Failed to extract text from {}", path.display()))?;
    Ok(chunk_document(
        name,
        &text,
        &chunking.separator,
        chunking.chunk_size,
        chunking.chunk_overlap,
    ))
}

/// Ingest every file under `inputs` into `store`.
pub async fn add_files(
    store: &DocumentStore,
    chunking: &ChunkingConfig,
    inputs: &[PathBuf],
) -> Result<IngestReport> {
    let files = collect_files(inputs)?;
    let mut report = IngestReport::default();

    for path in files {
        match add_file(store, chunking, &path).await {
            Ok((name, chunks)) => report.outcomes.push(FileOutcome::Added { name, chunks }),
            Err(error) => {
                warn!(path = %path.display(), error = %error, "file not added");
                report.outcomes.push(FileOutcome::Failed { path, error });
            }
        }
    }

    info!(
        added = report.added(),
        failed = report.failed(),
        "ingestion finished"
    );
    Ok(report)
}

async fn add_file(
    store: &DocumentStore,
    chunking: &ChunkingConfig,
    path: &Path,
) -> Result<(String, usize)> {
    let name = document_name(path)?;
    let chunks = load_chunks(path, &name, chunking)?;
    debug!(document = %name, chunks = chunks.len(), "file split");
    let texts: Vec<String> = chunks.into_iter().map(|chunk| chunk.text).collect();
    let ids = store.add(&name, &texts).await?;
    Ok((name, ids.len()))
}
