use super::{DocumentBuilder, DocumentMetadata, ReferenceDocument};
use crate::error::ToolError;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::io::{Cursor, Read};
use zip::ZipArchive;
use zip::result::ZipError;

type Package<'a> = ZipArchive<Cursor<&'a [u8]>>;

fn read_part(
    label: &str,
    archive: &mut Package<'_>,
    name: &str,
) -> Result<Option<String>, ToolError> {
    let mut part = match archive.by_name(name) {
        Ok(part) => part,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(ToolError::parse(label, format!("cannot read {name}: {e}"))),
    };
    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| ToolError::parse(label, format!("cannot read {name}: {e}")))?;
    Ok(Some(xml))
}

/// `w:val` of a `w:pStyle` element.
fn style_id(element: &BytesStart<'_>) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == b"val")
        .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())
}

/// `Heading1` style ids map to level 1; a heading style without a digit is level 1.
fn heading_level(style: &str) -> Option<usize> {
    if !style.to_ascii_lowercase().contains("heading") {
        return None;
    }
    let level = style
        .chars()
        .find_map(|c| c.to_digit(10))
        .map_or(1, |d| d as usize);
    Some(level)
}

#[derive(Default)]
struct OpenTable {
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: Vec<String>,
}

/// Walk `word/document.xml`: paragraphs outside tables become headings or
/// paragraphs by style, table cells collect their paragraphs.
fn read_body(label: &str, xml: &str, b: &mut DocumentBuilder) -> Result<(), ToolError> {
    let mut reader = Reader::from_str(xml);
    let mut paragraph = String::new();
    let mut style: Option<String> = None;
    let mut in_text = false;
    let mut tables: Vec<OpenTable> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ToolError::parse(label, format!("word/document.xml: {e}")))?;
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => {
                    paragraph.clear();
                    style = None;
                }
                b"pStyle" => style = style_id(&e),
                b"t" => in_text = true,
                b"tbl" => tables.push(OpenTable::default()),
                b"tr" => {
                    if let Some(table) = tables.last_mut() {
                        table.row.clear();
                    }
                }
                b"tc" => {
                    if let Some(table) = tables.last_mut() {
                        table.cell.clear();
                    }
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"pStyle" => style = style_id(&e),
                b"tab" => paragraph.push('\t'),
                b"br" | b"cr" => paragraph.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => {
                let text = t
                    .unescape()
                    .map_err(|e| ToolError::parse(label, format!("word/document.xml: {e}")))?;
                paragraph.push_str(&text);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let text = paragraph.trim();
                    if let Some(table) = tables.last_mut() {
                        if !text.is_empty() {
                            table.cell.push(text.to_string());
                        }
                    } else {
                        match style.as_deref().and_then(heading_level) {
                            Some(level) => b.heading(text, level),
                            None => b.paragraph(text),
                        }
                    }
                    paragraph.clear();
                }
                b"tc" => {
                    if let Some(table) = tables.last_mut() {
                        let cell = table.cell.join("\n");
                        table.row.push(cell);
                    }
                }
                b"tr" => {
                    if let Some(table) = tables.last_mut() {
                        let row = std::mem::take(&mut table.row);
                        table.rows.push(row);
                    }
                }
                b"tbl" => {
                    if let Some(table) = tables.pop() {
                        b.table(table.rows);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(())
}

/// Dublin Core fields of `docProps/core.xml`. Unreadable metadata is dropped.
fn read_core_properties(xml: &str) -> Option<DocumentMetadata> {
    let mut reader = Reader::from_str(xml);
    let mut meta = DocumentMetadata::default();
    let mut field: Option<Vec<u8>> = None;
    loop {
        match reader.read_event().ok()? {
            Event::Start(e) => field = Some(e.local_name().as_ref().to_vec()),
            Event::End(_) => field = None,
            Event::Text(t) => {
                let value = t.unescape().ok()?.trim().to_string();
                if value.is_empty() {
                    continue;
                }
                let slot = match field.as_deref() {
                    Some(b"creator") => &mut meta.author,
                    Some(b"title") => &mut meta.title,
                    Some(b"subject") => &mut meta.subject,
                    Some(b"created") => &mut meta.created,
                    Some(b"modified") => &mut meta.modified,
                    _ => continue,
                };
                *slot = Some(value);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Some(meta)
}

/// Parse a Word document: headings come from `Heading N` paragraph styles,
/// the title from the core properties or the first level-1 heading.
pub fn parse_docx(label: &str, bytes: &[u8]) -> Result<ReferenceDocument, ToolError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| {
        ToolError::parse(
            label,
            format!("cannot open as DOCX, the file may be corrupted: {e}"),
        )
    })?;
    let body = read_part(label, &mut archive, "word/document.xml")?.ok_or_else(|| {
        ToolError::parse(label, "not a DOCX document: word/document.xml is missing")
    })?;
    let metadata = read_part(label, &mut archive, "docProps/core.xml")
        .ok()
        .flatten()
        .and_then(|xml| read_core_properties(&xml));

    let mut b = DocumentBuilder::default();
    read_body(label, &body, &mut b)?;
    Ok(b.finish(label, metadata))
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;
    use std::io::Write;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    fn paragraph(style: &str, text: &str) -> String {
        let props = if style.is_empty() {
            String::new()
        } else {
            format!(r#"<w:pPr><w:pStyle w:val="{style}"/></w:pPr>"#)
        };
        format!("<w:p>{props}<w:r><w:t>{text}</w:t></w:r></w:p>")
    }

    fn document(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}<w:sectPr/></w:body></w:document>"#
        )
    }

    fn core(title: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/"><dc:title>{title}</dc:title><dc:creator>ops</dc:creator><dcterms:created>2024-03-01T10:00:00Z</dcterms:created></cp:coreProperties>"#
        )
    }

    fn zip(parts: &[(&str, String)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, content) in parts {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    /// A minimal package with core properties and `(style, text)` paragraphs.
    pub(crate) fn package(title: &str, paragraphs: &[(&str, &str)]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|(style, text)| paragraph(style, text))
            .collect();
        zip(&[
            ("word/document.xml", document(&body)),
            ("docProps/core.xml", core(title)),
        ])
    }

    #[test]
    fn headings_paragraphs_and_tables_are_extracted() {
        let table = "<w:tbl><w:tr>\
            <w:tc><w:p><w:r><w:t>Step</w:t></w:r></w:p></w:tc>\
            <w:tc><w:p><w:r><w:t>Command</w:t></w:r></w:p></w:tc>\
            </w:tr><w:tr>\
            <w:tc><w:p><w:r><w:t>1</w:t></w:r></w:p></w:tc>\
            <w:tc><w:p><w:r><w:t>nginx -t &amp;&amp; reload</w:t></w:r></w:p></w:tc>\
            </w:tr></w:tbl>";
        let body = [
            paragraph("Heading1", "Upgrade nginx"),
            paragraph("", "Maintenance window procedure."),
            "<w:p/>".to_string(),
            paragraph("Heading2", "Pre-checks"),
            "<w:p><w:r><w:t xml:space=\"preserve\">Confirm </w:t></w:r>\
             <w:r><w:t>backups</w:t></w:r></w:p>"
                .to_string(),
            table.to_string(),
        ]
        .concat();
        let bytes = zip(&[("word/document.xml", document(&body))]);

        let doc = parse_docx("mop.docx", &bytes).unwrap();
        assert_eq!(doc.title.as_deref(), Some("Upgrade nginx"));
        assert_eq!(
            doc.headings.iter().map(|h| (h.text.as_str(), h.level)).collect::<Vec<_>>(),
            [("Upgrade nginx", 1), ("Pre-checks", 2)]
        );
        assert_eq!(
            doc.paragraphs,
            ["Maintenance window procedure.", "Confirm backups"]
        );
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.tables, [[["Step", "Command"], ["1", "nginx -t && reload"]]]);
        assert!(doc.full_text.ends_with("Step | Command\n1 | nginx -t && reload"));
        assert_eq!(doc.metadata, None);
    }

    #[test]
    fn core_properties_supply_title_and_metadata() {
        let bytes = package(
            "Quarterly patching",
            &[("Heading1", "Overview"), ("", "Patch everything.")],
        );
        let doc = parse_docx("mop.docx", &bytes).unwrap();
        assert_eq!(doc.title.as_deref(), Some("Quarterly patching"));
        let meta = doc.metadata.unwrap();
        assert_eq!(meta.author.as_deref(), Some("ops"));
        assert_eq!(meta.created.as_deref(), Some("2024-03-01T10:00:00Z"));
        assert_eq!(meta.subject, None);
    }

    #[test]
    fn zip_without_document_part_is_rejected() {
        let bytes = zip(&[("readme.txt", "hello".to_string())]);
        let err = parse_docx("x.docx", &bytes).unwrap_err();
        assert!(err.to_string().contains("word/document.xml is missing"));
    }

    #[test]
    fn heading_levels_come_from_style_ids() {
        assert_eq!(heading_level("Heading3"), Some(3));
        assert_eq!(heading_level("heading"), Some(1));
        assert_eq!(heading_level("Title"), None);
        assert_eq!(heading_level("ListParagraph"), None);
    }
}
