//! Visible paragraph text from a DOCX file.
//!
//! A DOCX file is a zip archive, and the body text lives in
//! `word/document.xml`. We only need the text of `t` runs plus paragraph
//! boundaries, tabs and line breaks. Elements are matched on local names,
//! since generators don't all bind WordprocessingML to the `w:` prefix.

use std::io::{Cursor, Read as _};

use quick_xml::{Reader, events::Event};

use crate::error::ExtractError;

/// The main document part inside the archive.
const DOCUMENT_PART: &str = "word/document.xml";

/// Extract paragraph text, joined by `\n` and trimmed.
pub fn docx_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let xml = read_document_part(bytes)?;
    Ok(paragraphs_from_xml(&xml)?.join("\n").trim().to_owned())
}

fn read_document_part(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| ExtractError::ParseFailure(format!("invalid DOCX archive: {err}")))?;
    let mut part = archive
        .by_name(DOCUMENT_PART)
        .map_err(|err| ExtractError::ParseFailure(format!("DOCX has no {DOCUMENT_PART}: {err}")))?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|err| ExtractError::ParseFailure(format!("cannot read {DOCUMENT_PART}: {err}")))?;
    Ok(xml)
}

fn paragraphs_from_xml(xml: &str) -> Result<Vec<String>, ExtractError> {
    let xml_error = |err: &dyn std::fmt::Display| {
        ExtractError::ParseFailure(format!("invalid {DOCUMENT_PART}: {err}"))
    };

    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    // Depth of open `t` elements. Text anywhere else is markup noise.
    let mut text_depth = 0usize;
    loop {
        match reader.read_event().map_err(|err| xml_error(&err))? {
            Event::Start(e) => {
                if e.local_name().as_ref() == b"t" {
                    text_depth += 1;
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => text_depth = text_depth.saturating_sub(1),
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                // Tab stops inside `tabs` carry attributes. Only a bare
                // `tab` is a tab character.
                b"tab" if e.attributes().next().is_none() => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Event::Text(e) if text_depth > 0 => {
                current.push_str(&e.unescape().map_err(|err| xml_error(&err))?);
            }
            Event::CData(e) if text_depth > 0 => {
                current.push_str(&String::from_utf8_lossy(&e));
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs)
}

/// Build a minimal DOCX archive around a `<w:body>` fragment.
#[cfg(test)]
pub(crate) fn docx_from_body(body: &str) -> Vec<u8> {
    use std::io::Write as _;

    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    );
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(br#"<?xml version="1.0"?><Types/>"#).unwrap();
    zip.start_file(DOCUMENT_PART, options).unwrap();
    zip.write_all(xml.as_bytes()).unwrap();
    zip.finish().unwrap().into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraphs_are_joined_in_order() {
        let docx = docx_from_body(
            r#"<w:p><w:pPr><w:pStyle w:val="Title"/></w:pPr><w:r><w:t>Lease</w:t></w:r><w:r><w:t xml:space="preserve"> Agreement</w:t></w:r></w:p>
<w:p/>
<w:p><w:r><w:t>Rent is due</w:t><w:tab/><w:t>monthly.</w:t></w:r></w:p>"#,
        );
        assert_eq!(
            docx_text(&docx).unwrap(),
            "Lease Agreement\n\nRent is due\tmonthly."
        );
    }

    #[test]
    fn tab_stops_are_not_tabs() {
        let xml = r#"<w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs></w:pPr><w:r><w:t>A</w:t><w:br/><w:t>B</w:t></w:r></w:p>"#;
        assert_eq!(paragraphs_from_xml(xml).unwrap(), vec!["A\nB"]);
    }

    #[test]
    fn entities_are_unescaped() {
        let xml = r#"<w:p><w:r><w:t>Smith &amp; Sons &lt;&#x41;&#66;&gt; &quot;x&apos;</w:t></w:r></w:p>"#;
        assert_eq!(paragraphs_from_xml(xml).unwrap(), vec!["Smith & Sons <AB> \"x'"]);
    }

    #[test]
    fn any_namespace_prefix_is_accepted() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<ns0:document xmlns:ns0="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><ns0:body><ns0:p><ns0:r><ns0:t>Hello</ns0:t><ns0:tab/><ns0:t>there</ns0:t></ns0:r></ns0:p><ns0:p><ns0:r><ns0:t>Bye</ns0:t></ns0:r></ns0:p></ns0:body></ns0:document>"#;
        assert_eq!(paragraphs_from_xml(xml).unwrap(), vec!["Hello\tthere", "Bye"]);
    }

    #[test]
    fn cdata_text_is_kept() {
        let docx = docx_from_body(
            r#"<w:p><w:r><w:t>a &gt; b</w:t></w:r></w:p><w:p><w:r><w:t><![CDATA[x < y]]></w:t></w:r></w:p>"#,
        );
        assert_eq!(docx_text(&docx).unwrap(), "a > b\nx < y");
    }

    #[test]
    fn text_outside_runs_is_ignored() {
        let xml = r#"<w:p><w:r><w:instrText>PAGE</w:instrText><w:t>Visible</w:t></w:r></w:p>"#;
        assert_eq!(paragraphs_from_xml(xml).unwrap(), vec!["Visible"]);
    }

    #[test]
    fn malformed_xml_is_a_parse_failure() {
        let docx = docx_from_body("<w:p><w:r><w:t>open</w:r></w:p>");
        let err = docx_text(&docx).unwrap_err();
        assert!(matches!(err, ExtractError::ParseFailure(_)), "{err:?}");
    }

    #[test]
    fn non_zip_is_a_parse_failure() {
        let err = docx_text(b"PK\x03\x04 truncated").unwrap_err();
        assert!(matches!(err, ExtractError::ParseFailure(_)));
    }

    #[test]
    fn zip_without_document_is_a_parse_failure() {
        use std::io::Write as _;

        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("hello.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"hi").unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        let err = docx_text(&bytes).unwrap_err();
        assert!(matches!(err, ExtractError::ParseFailure(msg) if msg.contains(DOCUMENT_PART)));
    }
}
