//! Procedure / reference documents: Markdown, plain text and DOCX.

mod docx;
mod markdown;

pub use docx::parse_docx;
pub use markdown::parse;

use super::common::{parse_args, path_property};
use super::traits::{ExecutionContext, Tool};
use super::types::{ToolKind, ToolPayload};
use crate::error::ToolError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

/// Office formats with no text extraction.
const BINARY_FORMATS: &[&str] = &["doc", "pdf", "odt", "rtf"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heading {
    pub text: String,
    pub level: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub heading: Option<String>,
    pub level: usize,
    pub content: Vec<String>,
}

/// Core properties of a DOCX package.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentMetadata {
    pub author: Option<String>,
    pub title: Option<String>,
    pub subject: Option<String>,
    pub created: Option<String>,
    pub modified: Option<String>,
}

/// A parsed reference document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceDocument {
    pub path: String,
    pub title: Option<String>,
    pub headings: Vec<Heading>,
    pub paragraphs: Vec<String>,
    pub sections: Vec<Section>,
    pub tables: Vec<Vec<Vec<String>>>,
    pub full_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DocumentMetadata>,
}

impl ReferenceDocument {
    pub fn stats(&self) -> Value {
        json!({
            "paragraph_count": self.paragraphs.len(),
            "heading_count": self.headings.len(),
            "table_count": self.tables.len(),
            "section_count": self.sections.len(),
            "character_count": self.full_text.chars().count(),
            "word_count": self.full_text.split_whitespace().count(),
        })
    }

    pub fn to_value(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Some(object) = value.as_object_mut() {
            object.insert("stats".into(), self.stats());
        }
        value
    }
}

// ── Document assembly ───────────────────────────────────────────────

/// Collects blocks in document order. Both the Markdown and the DOCX
/// readers feed it, so the two formats produce the same shape.
#[derive(Default)]
pub(crate) struct DocumentBuilder {
    full_text: Vec<String>,
    headings: Vec<Heading>,
    paragraphs: Vec<String>,
    sections: Vec<Section>,
    tables: Vec<Vec<Vec<String>>>,
    current: Option<Section>,
}

impl DocumentBuilder {
    pub(crate) fn heading(&mut self, text: &str, level: usize) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.flush_section();
        self.full_text.push(text.to_string());
        self.current = Some(Section {
            heading: Some(text.to_string()),
            level,
            content: Vec::new(),
        });
        self.headings.push(Heading {
            text: text.to_string(),
            level,
        });
    }

    /// Code blocks keep their inner whitespace, so only blank text is dropped.
    pub(crate) fn paragraph(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        self.full_text.push(text.to_string());
        self.paragraphs.push(text.to_string());
        self.current
            .get_or_insert_with(|| Section {
                heading: None,
                level: 0,
                content: Vec::new(),
            })
            .content
            .push(text.to_string());
    }

    pub(crate) fn table(&mut self, rows: Vec<Vec<String>>) {
        if rows.is_empty() {
            return;
        }
        self.full_text.extend(rows.iter().map(|row| row.join(" | ")));
        self.tables.push(rows);
    }

    fn flush_section(&mut self) {
        if let Some(section) = self.current.take()
            && (section.heading.is_some() || !section.content.is_empty())
        {
            self.sections.push(section);
        }
    }

    /// The title is the metadata title when present, else the first level-1
    /// heading, else the first heading of any level.
    pub(crate) fn finish(
        mut self,
        label: &str,
        metadata: Option<DocumentMetadata>,
    ) -> ReferenceDocument {
        self.flush_section();
        let title = metadata
            .as_ref()
            .and_then(|meta| meta.title.clone())
            .or_else(|| {
                self.headings
                    .iter()
                    .find(|h| h.level == 1)
                    .or_else(|| self.headings.first())
                    .map(|h| h.text.clone())
            });
        ReferenceDocument {
            path: label.to_string(),
            title,
            headings: self.headings,
            paragraphs: self.paragraphs,
            sections: self.sections,
            tables: self.tables,
            full_text: self.full_text.join("\n"),
            metadata,
        }
    }
}

// ── Loading ─────────────────────────────────────────────────────────

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

fn reject_binary(label: &str, path: &Path) -> Result<(), ToolError> {
    let ext = extension(path);
    if BINARY_FORMATS.contains(&ext.as_str()) {
        return Err(ToolError::Unsupported(format!(
            "'{label}' is a .{ext} document; convert it to DOCX, Markdown or plain text first"
        )));
    }
    Ok(())
}

async fn read_docx(label: &str, path: &Path) -> Result<ReferenceDocument, ToolError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ToolError::NotFound(label.to_string()));
        }
        Err(e) => return Err(ToolError::io(label, e)),
    };
    parse_docx(label, &bytes)
}

/// Load a document from anywhere on disk (startup `--reference` flags).
pub async fn load(path: &Path) -> Result<ReferenceDocument, ToolError> {
    let label = path.display().to_string();
    if extension(path) == "docx" {
        return read_docx(&label, path).await;
    }
    reject_binary(&label, path)?;
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ToolError::NotFound(label));
        }
        Err(e) => return Err(ToolError::io(label, e)),
    };
    Ok(parse(&label, &text))
}

#[derive(Deserialize)]
struct Args {
    path: String,
}

pub struct ReadReferenceDocumentTool;

impl Tool for ReadReferenceDocumentTool {
    fn kind(&self) -> ToolKind {
        ToolKind::ReadReferenceDocument
    }

    fn description(&self) -> &str {
        "Read a procedure or reference document (DOCX, Markdown or plain text): title, \
         headings, sections, tables, metadata, statistics and full text"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "path": path_property("Path to the document") },
            "required": ["path"]
        })
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: Args = parse_args(self.kind(), args)?;
            let path = ctx.resolve(&args.path)?;
            let label = ctx.label(&path);
            let doc = if extension(&path) == "docx" {
                read_docx(&label, &path).await?
            } else {
                reject_binary(&label, &path)?;
                let source = ctx.read_source(&args.path).await?;
                parse(&source.label, &source.content)
            };
            Ok(ToolPayload::Structured(doc.to_value()))
        })
    }
}
