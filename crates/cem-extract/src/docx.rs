//! DOCX extractor (§4.4), grounded in `original_source/app/services/
//! extraction/docx_extractor.py`. No XML-parsing crate appears in this
//! workspace's corpus, so `word/document.xml` is opened via `zip` (already
//! grounded for OOXML container access — see DESIGN.md) and its text runs
//! are pulled out with a `<w:t ...>...</w:t>` regex scan rather than a full
//! XML DOM; both paragraph and table-cell text live in the same run
//! elements in OOXML, so this single scan covers both, matching the
//! original's "process both paragraphs and tables" scope.

use regex::Regex;
use std::io::Read;
use std::sync::OnceLock;

use cem_schemas::{ExtractionMethod, Gesamtforderung, SourceExtraction};

use crate::{amount, name, preprocessing};

fn run_text_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"<w:t[^>]*>([^<]*)</w:t>").unwrap())
}

pub fn extract(bytes: &[u8], source_name: &str) -> SourceExtraction {
    let document_xml = match read_zip_entry(bytes, "word/document.xml") {
        Ok(xml) => xml,
        Err(reason) => return SourceExtraction::skipped("docx", source_name, &reason),
    };

    let all_text: String = run_text_pattern()
        .captures_iter(&document_xml)
        .filter_map(|c| c.get(1).map(|m| decode_xml_entities(m.as_str())))
        .collect::<Vec<_>>()
        .join(" ");

    let preprocessed = preprocessing::preprocess(&all_text);
    let found = amount::find_amounts(&preprocessed);
    let gesamtforderung = found.into_iter().max_by(|a, b| a.value.cmp(&b.value)).map(|best| Gesamtforderung {
        value: best.value,
        currency: "EUR".to_string(),
        raw_text: best.raw,
        source: source_name.to_string(),
        confidence: best.confidence,
    });
    let names = name::extract_names(&preprocessed);

    SourceExtraction {
        source_type: "docx".to_string(),
        source_name: source_name.to_string(),
        gesamtforderung,
        components: Vec::new(),
        client_name: names.client_name.map(|n| n.value),
        creditor_name: names.creditor_name.map(|n| n.value),
        extraction_method: ExtractionMethod::Docx,
        tokens_used: 0,
        error: None,
    }
}

pub(crate) fn read_zip_entry(bytes: &[u8], entry_name: &str) -> Result<String, String> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor).map_err(|e| format!("invalid zip container: {e}"))?;
    let mut entry = archive.by_name(entry_name).map_err(|_| format!("missing entry: {entry_name}"))?;
    let mut contents = String::new();
    entry.read_to_string(&mut contents).map_err(|e| format!("non-utf8 entry {entry_name}: {e}"))?;
    Ok(contents)
}

pub(crate) fn decode_xml_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn make_docx(document_xml: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let cursor = std::io::Cursor::new(&mut buf);
            let mut writer = zip::ZipWriter::new(cursor);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("word/document.xml", options).unwrap();
            writer.write_all(document_xml.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        buf
    }

    #[test]
    fn extracts_amount_from_document_xml_runs() {
        let xml = r#"<w:document><w:body><w:p><w:r><w:t>Gesamtforderung:</w:t></w:r><w:r><w:t>1.234,56 EUR</w:t></w:r></w:p></w:body></w:document>"#;
        let docx = make_docx(xml);
        let result = extract(&docx, "claim.docx");
        assert_eq!(result.gesamtforderung.unwrap().value.to_string(), "1234.56");
    }

    #[test]
    fn missing_entry_is_skipped() {
        let docx = make_docx("<w:document/>");
        // rename so the lookup for word/document.xml still succeeds above;
        // verify the skip path on a genuinely empty archive instead.
        let empty = {
            let mut buf = Vec::new();
            let cursor = std::io::Cursor::new(&mut buf);
            let writer = zip::ZipWriter::new(cursor);
            writer.finish().unwrap();
            buf
        };
        let result = extract(&empty, "broken.docx");
        assert!(result.error.is_some());
        let _ = docx;
    }
}
