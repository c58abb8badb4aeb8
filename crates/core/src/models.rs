use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Metadata = BTreeMap<String, String>;

/// A unit of loaded source text: a whole text file or a single PDF page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub doc_id: String,
    pub text: String,
    pub metadata: Metadata,
}

/// A chunk of a document, the unit that gets embedded and retrieved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextNode {
    pub node_id: String,
    pub ref_doc_id: String,
    pub chunk_index: u64,
    pub text: String,
    pub metadata: Metadata,
}

impl TextNode {
    /// Text handed to the language model: metadata lines, blank line, body.
    pub fn content_with_metadata(&self) -> String {
        let header = self
            .metadata
            .iter()
            .filter(|(key, _)| METADATA_FOR_LLM.contains(&key.as_str()))
            .map(|(key, value)| format!("{key}: {value}"))
            .collect::<Vec<_>>();

        if header.is_empty() {
            self.text.clone()
        } else {
            format!("{}\n\n{}", header.join("\n"), self.text)
        }
    }
}

const METADATA_FOR_LLM: [&str; 3] = ["file_name", "file_path", "page_label"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeWithScore {
    pub node: TextNode,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_content_skips_bookkeeping_metadata() {
        let mut metadata = Metadata::new();
        metadata.insert("file_name".to_string(), "a.pdf".to_string());
        metadata.insert("page_label".to_string(), "3".to_string());
        metadata.insert("file_size".to_string(), "1024".to_string());

        let node = TextNode {
            node_id: "n".to_string(),
            ref_doc_id: "d".to_string(),
            chunk_index: 0,
            text: "body".to_string(),
            metadata,
        };

        assert_eq!(
            node.content_with_metadata(),
            "file_name: a.pdf\npage_label: 3\n\nbody"
        );
    }
}
