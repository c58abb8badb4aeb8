use crate::error::IngestError;
use crate::models::{Document, TextNode};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub min_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 1_200,
            overlap_chars: 120,
            min_chars: 1,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be positive".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than max {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn chunk_by_paragraph(text: &str, config: ChunkingConfig) -> Vec<String> {
    let paragraphs = split_paragraphs(text);

    let mut packed = Vec::new();
    let mut current = String::new();

    for paragraph in paragraphs {
        if current.is_empty() {
            current.push_str(&paragraph);
            continue;
        }

        if char_len(&current) + char_len(&paragraph) + 2 <= config.max_chars {
            current.push_str("\n\n");
            current.push_str(&paragraph);
        } else {
            packed.push(std::mem::take(&mut current));
            current.push_str(&paragraph);
        }
    }

    if !current.is_empty() {
        packed.push(current);
    }

    let mut with_overlap = Vec::new();
    for chunk in packed {
        if char_len(&chunk) <= config.max_chars {
            with_overlap.push(chunk);
            continue;
        }

        let chars: Vec<char> = chunk.chars().collect();
        let step = config.max_chars.saturating_sub(config.overlap_chars).max(1);
        let mut start = 0;
        while start < chars.len() {
            let end = (start + config.max_chars).min(chars.len());
            with_overlap.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }
    }

    with_overlap
        .into_iter()
        .filter(|chunk| char_len(chunk.trim()) >= config.min_chars)
        .collect()
}

fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut lines = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !lines.is_empty() {
                paragraphs.push(normalize_whitespace(&lines.join(" ")));
                lines.clear();
            }
        } else {
            lines.push(line);
        }
    }

    if !lines.is_empty() {
        paragraphs.push(normalize_whitespace(&lines.join(" ")));
    }

    paragraphs
        .into_iter()
        .filter(|paragraph| !paragraph.is_empty())
        .collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Splits documents into nodes; node ids are stable for identical input.
pub fn split_documents(
    documents: &[Document],
    config: &ChunkingConfig,
) -> Result<Vec<TextNode>, IngestError> {
    config.validate()?;

    let mut nodes = Vec::new();
    let mut cursor = 0u64;

    for document in documents {
        for raw_chunk in chunk_by_paragraph(&document.text, *config) {
            nodes.push(TextNode {
                node_id: make_node_id(&document.doc_id, cursor, &raw_chunk),
                ref_doc_id: document.doc_id.clone(),
                chunk_index: cursor,
                text: raw_chunk,
                metadata: document.metadata.clone(),
            });
            cursor = cursor.saturating_add(1);
        }
    }

    Ok(nodes)
}

fn make_node_id(document_id: &str, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;

    fn document(id: &str, text: &str) -> Document {
        Document {
            doc_id: id.to_string(),
            text: text.to_string(),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof \u{a0}  spacing";
        assert_eq!(normalize_whitespace(input), "A lot of spacing");
    }

    #[test]
    fn short_paragraphs_are_packed_together() {
        let config = ChunkingConfig {
            max_chars: 40,
            overlap_chars: 5,
            min_chars: 1,
        };

        let text = "First   para.\n\nSecond para.\n\n\nThird one is here.";
        let chunks = chunk_by_paragraph(text, config);
        assert_eq!(chunks, vec!["First para.\n\nSecond para.", "Third one is here."]);
    }

    #[test]
    fn oversize_paragraph_is_windowed_with_overlap() {
        let config = ChunkingConfig {
            max_chars: 10,
            overlap_chars: 4,
            min_chars: 1,
        };

        let chunks = chunk_by_paragraph("abcdefghijklmnop", config);
        assert_eq!(chunks, vec!["abcdefghij", "ghijklmnop"]);
    }

    #[test]
    fn invalid_overlap_is_rejected() {
        let config = ChunkingConfig {
            max_chars: 10,
            overlap_chars: 10,
            min_chars: 1,
        };

        let result = split_documents(&[document("d", "text")], &config);
        assert!(matches!(result, Err(IngestError::InvalidChunkConfig(_))));
    }

    #[test]
    fn nodes_reference_their_document_and_are_numbered() {
        let documents = vec![document("doc-1", "alpha"), document("doc-2", "beta\n\ngamma")];
        let nodes = split_documents(&documents, &ChunkingConfig::default()).unwrap();

        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].ref_doc_id, "doc-1");
        assert_eq!(nodes[1].ref_doc_id, "doc-2");
        assert_eq!(nodes[1].chunk_index, 1);
        assert_eq!(nodes[1].text, "beta\n\ngamma");

        let again = split_documents(&documents, &ChunkingConfig::default()).unwrap();
        assert_eq!(nodes[0].node_id, again[0].node_id);
    }

    #[test]
    fn blank_document_yields_no_nodes() {
        let nodes =
            split_documents(&[document("d", "  \n\n ")], &ChunkingConfig::default()).unwrap();
        assert!(nodes.is_empty());
    }
}
