//! Rendering plain text as a simple PDF.
//!
//! The output is deliberately plain: Helvetica on A4, word-wrapped, with a
//! form feed (`\x0c`) forcing a page break. Each line is its own text
//! object, so the text layer reads back one line per line.

use lopdf::{
    Document, Object, Stream, StringFormat,
    content::{Content, Operation},
    dictionary,
};

use crate::prelude::*;

/// Maximum characters per line before wrapping.
const WRAP_COLUMNS: usize = 90;

/// Maximum lines per page.
const LINES_PER_PAGE: usize = 60;

/// A4, in points.
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;

const MARGIN_LEFT: i64 = 50;
const FIRST_BASELINE: i64 = 800;
const FONT_SIZE: i64 = 10;
const LEADING: i64 = 12;

/// The only font we use, and its encoding.
const FONT_NAME: &str = "F1";
const FONT_ENCODING: &str = "WinAnsiEncoding";

/// Render `text` as PDF bytes. Empty text renders a single blank page.
#[instrument(level = "debug", skip_all, fields(chars = text.len()))]
pub fn render_pdf(text: &str) -> Result<Vec<u8>> {
    let pages = layout(text);
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => FONT_ENCODING,
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            FONT_NAME => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for lines in &pages {
        let content = page_content(lines);
        let encoded = content.encode().context("failed to encode page content")?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let page_count = i64::try_from(kids.len()).context("too many pages")?;
    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => page_count,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out).context("failed to write PDF")?;
    debug!(pages = pages.len(), bytes = out.len(), "Rendered PDF");
    Ok(out)
}

/// Build the content stream for one page.
fn page_content(lines: &[String]) -> Content {
    let mut operations = Vec::new();
    let mut baseline = FIRST_BASELINE;
    for line in lines {
        if !line.trim().is_empty() {
            let encoded = Document::encode_text(Some(FONT_ENCODING), line);
            operations.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![FONT_NAME.into(), FONT_SIZE.into()]),
                Operation::new("Td", vec![MARGIN_LEFT.into(), baseline.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::String(encoded, StringFormat::Literal)],
                ),
                Operation::new("ET", vec![]),
            ]);
        }
        baseline -= LEADING;
    }
    Content { operations }
}

/// Split text into pages of wrapped lines.
fn layout(text: &str) -> Vec<Vec<String>> {
    let mut pages = Vec::new();
    for section in text.split('\x0c') {
        let lines = section
            .lines()
            .flat_map(|line| wrap_line(line, WRAP_COLUMNS))
            .collect::<Vec<_>>();
        if lines.is_empty() {
            pages.push(vec![]);
        } else {
            pages.extend(lines.chunks(LINES_PER_PAGE).map(|chunk| chunk.to_vec()));
        }
    }
    pages
}

/// Greedy word wrap. Words longer than `width` are split. Blank lines are
/// kept as a single empty line.
fn wrap_line(line: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for word in line.split_whitespace() {
        let mut word = word;
        while word.chars().count() > width {
            if current_len > 0 {
                out.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let split_at = word
                .char_indices()
                .nth(width)
                .map(|(idx, _)| idx)
                .unwrap_or(word.len());
            out.push(word[..split_at].to_owned());
            word = &word[split_at..];
        }
        if word.is_empty() {
            continue;
        }
        let word_len = word.chars().count();
        if current_len > 0 && current_len + 1 + word_len > width {
            out.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }
    if current_len > 0 || out.is_empty() {
        out.push(current);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_texts(pdf: &[u8]) -> Vec<String> {
        let doc = Document::load_mem(pdf).unwrap();
        doc.get_pages()
            .keys()
            .map(|&page_no| doc.extract_text(&[page_no]).unwrap())
            .collect()
    }

    #[test]
    fn wraps_on_word_boundaries() {
        assert_eq!(wrap_line("aa bb cc dd", 5), vec!["aa bb", "cc dd"]);
        assert_eq!(wrap_line("", 5), vec![""]);
        assert_eq!(wrap_line("abcdefghij x", 4), vec!["abcd", "efgh", "ij x"]);
    }

    #[test]
    fn form_feeds_break_pages() {
        let pages = layout("one\x0c\x0cthree");
        assert_eq!(pages.len(), 3);
        assert!(pages[1].is_empty());
    }

    #[test]
    fn long_text_spills_onto_more_pages() {
        let text = (0..130).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let pages = layout(&text);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].len(), LINES_PER_PAGE);
        assert_eq!(pages[2].len(), 10);
    }

    #[test]
    fn rendered_text_can_be_read_back() {
        let pdf = render_pdf("Hello, world!\nSecond line\x0cCafé").unwrap();
        let texts = page_texts(&pdf);
        assert_eq!(texts.len(), 2);
        assert_eq!(texts[0], "Hello, world!\nSecond line\n");
        assert_eq!(texts[1].trim(), "Café");
    }

    #[test]
    fn blank_pages_have_no_text_layer() {
        let pdf = render_pdf("Hello\x0c\x0cGoodbye").unwrap();
        let texts = page_texts(&pdf);
        assert_eq!(texts.len(), 3);
        assert_eq!(texts[1], "");
    }

    #[test]
    fn empty_text_renders_one_page() {
        let pdf = render_pdf("").unwrap();
        assert_eq!(page_texts(&pdf).len(), 1);
    }
}
