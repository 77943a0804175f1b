use super::{DocumentBuilder, ReferenceDocument};
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

fn take_trimmed(buf: &mut String) -> String {
    let text = buf.trim().to_string();
    buf.clear();
    text
}

/// Emit the text gathered so far for the innermost list item.
fn flush_item(b: &mut DocumentBuilder, items: &[String], inline: &mut String) {
    if let Some(marker) = items.last() {
        let text = take_trimmed(inline);
        if !text.is_empty() {
            b.paragraph(&format!("{marker}{text}"));
        }
    }
}

/// Parse Markdown / plain text into headings, sections, paragraphs and tables.
///
/// List items become one paragraph each with their marker; fenced and
/// indented code blocks become one verbatim paragraph.
pub fn parse(label: &str, text: &str) -> ReferenceDocument {
    let mut b = DocumentBuilder::default();
    let mut inline = String::new();
    let mut code: Option<String> = None;
    let mut table: Option<Vec<Vec<String>>> = None;
    let mut row: Vec<String> = Vec::new();
    // Next number for each open ordered list, `None` for bullets.
    let mut lists: Vec<Option<u64>> = Vec::new();
    let mut items: Vec<String> = Vec::new();

    for event in Parser::new_ext(text, Options::ENABLE_TABLES) {
        match event {
            Event::Start(Tag::Heading { .. }) | Event::Start(Tag::TableCell) => inline.clear(),
            Event::End(TagEnd::Heading(level)) => {
                b.heading(&take_trimmed(&mut inline), level as usize);
            }

            Event::Start(Tag::Paragraph) => {
                if items.is_empty() {
                    inline.clear();
                } else if !inline.is_empty() {
                    inline.push(' ');
                }
            }
            Event::End(TagEnd::Paragraph) => {
                if items.is_empty() {
                    let text = take_trimmed(&mut inline);
                    b.paragraph(&text);
                }
            }

            Event::Start(Tag::List(start)) => {
                flush_item(&mut b, &items, &mut inline);
                lists.push(start);
            }
            Event::End(TagEnd::List(_)) => {
                lists.pop();
            }
            Event::Start(Tag::Item) => {
                let marker = match lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{n}. ");
                        *n += 1;
                        marker
                    }
                    _ => "- ".to_string(),
                };
                items.push(marker);
                inline.clear();
            }
            Event::End(TagEnd::Item) => {
                flush_item(&mut b, &items, &mut inline);
                items.pop();
            }

            Event::Start(Tag::CodeBlock(_)) => {
                flush_item(&mut b, &items, &mut inline);
                code = Some(String::new());
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some(block) = code.take() {
                    b.paragraph(block.trim_end_matches('\n'));
                }
            }

            Event::Start(Tag::Table(_)) => table = Some(Vec::new()),
            Event::End(TagEnd::Table) => {
                if let Some(rows) = table.take() {
                    b.table(rows);
                }
            }
            Event::Start(Tag::TableHead) | Event::Start(Tag::TableRow) => row.clear(),
            Event::End(TagEnd::TableHead) | Event::End(TagEnd::TableRow) => {
                if let Some(rows) = table.as_mut() {
                    rows.push(std::mem::take(&mut row));
                }
            }
            Event::End(TagEnd::TableCell) => row.push(take_trimmed(&mut inline)),

            Event::Text(t) | Event::Code(t) => match code.as_mut() {
                Some(block) => block.push_str(&t),
                None => inline.push_str(&t),
            },
            Event::SoftBreak | Event::HardBreak => inline.push(' '),
            _ => {}
        }
    }
    b.finish(label, None)
}
