use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::models::{Document, Metadata};
use crate::IngestError;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

pub struct LoadReport {
    pub documents: Vec<Document>,
    pub skipped_files: Vec<SkippedFile>,
}

/// Loads every file of a directory as documents. PDFs yield one document per
/// page, everything else is read as text.
#[derive(Debug, Clone)]
pub struct DirectoryReader {
    input_dir: PathBuf,
    recursive: bool,
    required_exts: Vec<String>,
}

impl DirectoryReader {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            recursive: false,
            required_exts: Vec::new(),
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Restrict loading to these extensions (with or without the leading dot).
    pub fn required_exts<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.required_exts = exts
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    pub fn discover_files(&self) -> Result<Vec<PathBuf>, IngestError> {
        if !self.input_dir.is_dir() {
            return Err(IngestError::MissingDirectory(
                self.input_dir.display().to_string(),
            ));
        }

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.input_dir)
            .max_depth(max_depth)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()))
            .filter_map(|item| item.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }

            if self.accepts(entry.path()) {
                files.push(entry.path().to_path_buf());
            }
        }

        files.sort_unstable();
        Ok(files)
    }

    pub fn load_data(&self) -> Result<LoadReport, IngestError> {
        let files = self.discover_files()?;

        let mut documents = Vec::new();
        let mut skipped_files = Vec::new();

        for path in files {
            match load_file(&path) {
                Ok(file_documents) => {
                    debug!(path = %path.display(), documents = file_documents.len(), "loaded file");
                    documents.extend(file_documents);
                }
                Err(error) => {
                    warn!(path = %path.display(), reason = %error, "skipped file");
                    skipped_files.push(SkippedFile {
                        path,
                        reason: error.to_string(),
                    });
                }
            }
        }

        if documents.is_empty() {
            return Err(IngestError::NoDocuments(
                self.input_dir.display().to_string(),
            ));
        }

        Ok(LoadReport {
            documents,
            skipped_files,
        })
    }

    fn accepts(&self, path: &Path) -> bool {
        if self.required_exts.is_empty() {
            return true;
        }

        extension_of(path).is_some_and(|ext| self.required_exts.contains(&ext))
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|name| name.starts_with('.'))
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

fn load_file(path: &Path) -> Result<Vec<Document>, IngestError> {
    let base = file_metadata(path)?;
    let file_path = path.to_string_lossy().to_string();

    if extension_of(path).as_deref() == Some("pdf") {
        let pages = LopdfExtractor.extract_pages(path)?;
        return Ok(pages
            .into_iter()
            .map(|page| {
                let mut metadata = base.clone();
                metadata.insert("page_label".to_string(), page.number.to_string());
                Document {
                    doc_id: generate_document_id(&format!("{file_path}#{}", page.number)),
                    text: page.text,
                    metadata,
                }
            })
            .collect());
    }

    let bytes = fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    Ok(vec![Document {
        doc_id: generate_document_id(&file_path),
        text,
        metadata: base,
    }])
}

fn file_metadata(path: &Path) -> Result<Metadata, IngestError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;
    let stat = fs::metadata(path)?;

    let mut metadata = Metadata::new();
    metadata.insert("file_path".to_string(), path.to_string_lossy().to_string());
    metadata.insert("file_name".to_string(), name.to_string());
    metadata.insert("file_size".to_string(), stat.len().to_string());
    if let Ok(modified) = stat.modified() {
        let modified: DateTime<Utc> = modified.into();
        metadata.insert(
            "last_modified_date".to_string(),
            modified.format("%Y-%m-%d").to_string(),
        );
    }

    Ok(metadata)
}

fn generate_document_id(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}
