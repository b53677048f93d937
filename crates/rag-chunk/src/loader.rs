//! Document loading and conversion of documents into chunks.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use rag_core::{Chunk, ChunkConfig, Chunker, DocumentKind, RagError, Result};

/// One page of a loaded document.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// 1-based page number; `None` for formats without pages.
    pub number: Option<u32>,

    /// Extracted text.
    pub text: String,
}

/// A document read from disk, before chunking.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// File name, recorded as `doc_name` on every chunk.
    pub name: String,

    /// Detected format.
    pub kind: DocumentKind,

    /// Pages in document order.
    pub pages: Vec<Page>,
}

impl SourceDocument {
    /// Build a single-page document from in-memory text.
    pub fn from_text(name: impl Into<String>, kind: DocumentKind, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            pages: vec![Page {
                number: None,
                text: text.into(),
            }],
        }
    }
}

/// Load a single supported file.
pub fn load_document(path: &Path) -> Result<SourceDocument> {
    let kind = DocumentKind::from_path(path).ok_or_else(|| RagError::LoadFailed {
        path: path.display().to_string(),
        reason: "unsupported file type".to_string(),
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let pages = match kind {
        DocumentKind::Pdf => {
            let text = pdf_extract::extract_text(path).map_err(|e| RagError::LoadFailed {
                path: path.display().to_string(),
                reason: format!("failed to extract PDF text: {}", e),
            })?;
            split_pdf_pages(&text)
        }
        DocumentKind::Markdown | DocumentKind::PlainText => {
            let text = std::fs::read_to_string(path).map_err(|e| RagError::LoadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            vec![Page { number: None, text }]
        }
    };

    debug!(doc = %name, kind = %kind, pages = pages.len(), "Loaded document");

    Ok(SourceDocument { name, kind, pages })
}

/// pdf-extract separates pages with form feeds.
fn split_pdf_pages(text: &str) -> Vec<Page> {
    text.split('\x0c')
        .enumerate()
        .map(|(i, page)| Page {
            number: Some(i as u32 + 1),
            text: page.to_string(),
        })
        .collect()
}

/// Load every supported document in a directory, sorted by file name.
///
/// A path pointing at a file loads just that file. Unreadable documents are
/// skipped with a warning; a directory with no loadable documents fails.
pub fn load_documents(path: &Path) -> Result<Vec<SourceDocument>> {
    if path.is_file() {
        return Ok(vec![load_document(path)?]);
    }

    let entries = std::fs::read_dir(path).map_err(|e| RagError::LoadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && DocumentKind::from_path(p).is_some())
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut documents = Vec::with_capacity(files.len());
    for file in &files {
        match load_document(file) {
            Ok(doc) => documents.push(doc),
            Err(e) => warn!(path = %file.display(), error = %e, "Skipping unreadable document"),
        }
    }

    if documents.is_empty() {
        return Err(RagError::LoadFailed {
            path: path.display().to_string(),
            reason: "no .pdf, .md or .txt documents found".to_string(),
        });
    }

    info!(path = %path.display(), documents = documents.len(), "Loaded documents");
    Ok(documents)
}

/// Split documents into chunks carrying `doc_name`, `page` and position.
///
/// Chunk indices count up across all pages of one document.
pub fn chunk_documents(
    documents: &[SourceDocument],
    chunker: &dyn Chunker,
    config: &ChunkConfig,
) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();

    for doc in documents {
        let mut index = 0u32;
        for page in &doc.pages {
            for data in chunker.chunk(&page.text, doc.kind, config)? {
                let mut chunk = Chunk::new(data.content, doc.name.clone()).with_index(index);
                if let Some(number) = page.number {
                    chunk = chunk.with_page(number);
                }
                chunks.push(chunk);
                index += 1;
            }
        }
        debug!(doc = %doc.name, chunks = index, "Chunked document");
    }

    Ok(chunks)
}
