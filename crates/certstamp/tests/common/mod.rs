//! Shared builders for certstamp integration tests: minimal PDFs,
//! manifest spreadsheets and batch archives, all built in memory.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use lopdf::{dictionary, Document, Object, Stream};
use zip::write::SimpleFileOptions;

use certstamp::{Config, Database, Issuer, Pacing};

/// A single-page US-Letter PDF with one line of text.
pub fn minimal_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let content_id = doc.add_object(Object::Stream(Stream::new(
        dictionary! {},
        b"BT /F1 12 Tf 50 700 Td (Certificate of Completion) Tj ET".to_vec(),
    )));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Contents" => content_id,
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// Builds a minimal XLSX workbook with one sheet holding `rows`
/// (header included). Cells are inline strings; empty strings become
/// empty cells.
pub fn manifest_xlsx(rows: &[Vec<&str>]) -> Vec<u8> {
    let mut sheet = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (row_index, row) in rows.iter().enumerate() {
        sheet.push_str(&format!(r#"<row r="{}">"#, row_index + 1));
        for (col_index, value) in row.iter().enumerate() {
            let cell_ref = format!("{}{}", column_letter(col_index), row_index + 1);
            if value.is_empty() {
                sheet.push_str(&format!(r#"<c r="{}"/>"#, cell_ref));
            } else {
                sheet.push_str(&format!(
                    r#"<c r="{}" t="inlineStr"><is><t>{}</t></is></c>"#,
                    cell_ref,
                    xml_escape(value)
                ));
            }
        }
        sheet.push_str("</row>");
    }
    sheet.push_str("</sheetData></worksheet>");

    let content_types = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
</Types>"#;

    let root_rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#;

    let workbook = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets>
</workbook>"#;

    let workbook_rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
</Relationships>"#;

    build_zip(&[
        ("[Content_Types].xml", content_types.as_bytes()),
        ("_rels/.rels", root_rels.as_bytes()),
        ("xl/workbook.xml", workbook.as_bytes()),
        ("xl/_rels/workbook.xml.rels", workbook_rels.as_bytes()),
        ("xl/worksheets/sheet1.xml", sheet.as_bytes()),
    ])
}

/// Assembles a batch archive from named entries.
pub fn batch_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    build_zip(entries)
}

/// A complete valid batch: a manifest with `count` rows and a matching
/// PDF per row. Certificate IDs are `C-1..`, filenames `cert-1.pdf..`.
pub fn standard_batch(count: usize) -> Vec<u8> {
    let pdf = minimal_pdf();
    let mut rows: Vec<Vec<String>> = vec![vec![
        "Certificate ID".to_string(),
        "Filename".to_string(),
        "Recipient Name".to_string(),
        "Email".to_string(),
    ]];
    for i in 1..=count {
        rows.push(vec![
            format!("C-{}", i),
            format!("cert-{}.pdf", i),
            format!("Recipient {}", i),
            format!("r{}@example.com", i),
        ]);
    }
    let rows_ref: Vec<Vec<&str>> = rows
        .iter()
        .map(|row| row.iter().map(String::as_str).collect())
        .collect();
    let manifest = manifest_xlsx(&rows_ref);

    let mut entries: Vec<(String, Vec<u8>)> = vec![("manifest.xlsx".to_string(), manifest)];
    for i in 1..=count {
        entries.push((format!("cert-{}.pdf", i), pdf.clone()));
    }
    let entries_ref: Vec<(&str, &[u8])> = entries
        .iter()
        .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
        .collect();
    build_zip(&entries_ref)
}

/// An issuer over an in-memory database with test-friendly pacing.
pub fn test_issuer(data_dir: &std::path::Path) -> Issuer {
    let db = Database::open_in_memory().expect("Failed to create test database");
    let config = Config {
        data_dir: data_dir.to_path_buf(),
        pacing: Pacing::None,
        retry_delay_ms: 0,
        ..Config::default()
    };
    Issuer::new(db, config)
}

fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        writer
            .start_file(name.to_string(), SimpleFileOptions::default())
            .unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn column_letter(index: usize) -> char {
    (b'A' + index as u8) as char
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
