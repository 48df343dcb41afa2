//! Local document sources: text, Markdown, and PDF files, single or
//! gathered from a directory tree.
//!
//! Each source yields `(text, metadata)`; failures are reported to the
//! caller and never touch the index.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use interview_coach_core::models::{Metadata, META_SOURCE, META_TYPE, META_URL};

/// File patterns picked up from directories when none are given.
pub const DEFAULT_INCLUDE: &[&str] = &["**/*.txt", "**/*.md", "**/*.markdown", "**/*.pdf"];

const ALWAYS_EXCLUDE: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

const RESUME_MARKERS: &[&str] = &["resume", "résumé", "cv"];

/// Caller overrides for the metadata attached to acquired documents.
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    pub source: Option<String>,
    pub url: Option<String>,
    pub kind: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AcquiredDocument {
    pub path: PathBuf,
    pub text: String,
    pub metadata: Metadata,
}

/// Reads one file or every matching file below a directory.
pub fn acquire(
    path: &Path,
    options: &SourceOptions,
    include: &[String],
    exclude: &[String],
) -> Result<Vec<AcquiredDocument>> {
    if path.is_dir() {
        scan_directory(path, include, exclude)?
            .into_iter()
            .map(|file| {
                let relative = file
                    .strip_prefix(path)
                    .unwrap_or(&file)
                    .to_string_lossy()
                    .to_string();
                read_file_as(&file, &relative, options)
            })
            .collect()
    } else if path.is_file() {
        Ok(vec![read_file(path, options)?])
    } else {
        bail!("No such file or directory: {}", path.display())
    }
}

/// Reads a single `.txt`, `.md` or `.pdf` file.
pub fn read_file(path: &Path, options: &SourceOptions) -> Result<AcquiredDocument> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    read_file_as(path, &name, options)
}

fn read_file_as(path: &Path, label: &str, options: &SourceOptions) -> Result<AcquiredDocument> {
    let text = extract_text(path)?;

    let mut metadata = Metadata::new();
    metadata.insert(
        META_SOURCE.to_string(),
        options.source.clone().unwrap_or_else(|| label.to_string()),
    );
    metadata.insert(
        META_TYPE.to_string(),
        options.kind.clone().unwrap_or_else(|| guess_kind(path).to_string()),
    );
    if let Some(url) = &options.url {
        metadata.insert(META_URL.to_string(), url.clone());
    }

    Ok(AcquiredDocument {
        path: path.to_path_buf(),
        text,
        metadata,
    })
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn extract_text(path: &Path) -> Result<String> {
    match extension(path).as_str() {
        "txt" | "md" | "markdown" => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        "pdf" => {
            let bytes =
                std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
            pdf_extract::extract_text_from_mem(&bytes)
                .map_err(|e| anyhow!("Failed to extract text from {}: {}", path.display(), e))
        }
        other => bail!(
            "Unsupported file type '{}' for {} (expected txt, md or pdf)",
            other,
            path.display()
        ),
    }
}

/// `resume` for files whose name marks them as a CV, `file` otherwise.
fn guess_kind(path: &Path) -> &'static str {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let is_resume = stem
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| RESUME_MARKERS.contains(&token))
        || stem.contains("이력서");
    if is_resume {
        "resume"
    } else {
        "file"
    }
}

/// Files below `root` matching `include` (or [`DEFAULT_INCLUDE`]) and not
/// `exclude`, sorted by path.
pub fn scan_directory(root: &Path, include: &[String], exclude: &[String]) -> Result<Vec<PathBuf>> {
    let include_set = if include.is_empty() {
        build_globset(DEFAULT_INCLUDE.iter().copied())?
    } else {
        build_globset(include.iter().map(String::as_str))?
    };
    let exclude_set = build_globset(
        ALWAYS_EXCLUDE
            .iter()
            .copied()
            .chain(exclude.iter().map(String::as_str)),
    )?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if exclude_set.is_match(relative) || !include_set.is_match(relative) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

fn build_globset<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob '{}'", pattern))?);
    }
    Ok(builder.build()?)
}
