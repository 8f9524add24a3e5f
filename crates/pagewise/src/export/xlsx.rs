//! Minimal Office Open XML workbook writer.
//!
//! Produces a single-sheet `.xlsx` with inline strings only, which every
//! spreadsheet reader accepts without a shared-strings table or styles.

use std::io::{Cursor, Write};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::aggregate::ExportRow;

pub const SHEET_NAME: &str = "Results";

const SPREADSHEET_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const RELATIONSHIP_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

#[derive(Error, Debug)]
#[error("Failed to build workbook: {0}")]
pub struct WorkbookError(String);

enum Cell<'a> {
    Number(u32),
    Text(&'a str),
}

/// Column headers, in order.
pub fn headers(batch: bool) -> Vec<&'static str> {
    let mut headers = vec!["Chunk"];
    if batch {
        headers.push("Source");
    }
    headers.extend(["Data Reference", "Description", "Source File", "Text"]);
    headers
}

/// Serializes `rows` into an `.xlsx` file. Batch exports get an extra
/// `Source` column with each row's job stem.
pub fn write_workbook(rows: &[ExportRow], batch: bool) -> Result<Vec<u8>, WorkbookError> {
    let sheet = sheet_xml(rows, batch)?;
    let workbook = workbook_xml()?;

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts: [(&str, &[u8]); 5] = [
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
        ("_rels/.rels", ROOT_RELS.as_bytes()),
        ("xl/workbook.xml", &workbook),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.as_bytes()),
        ("xl/worksheets/sheet1.xml", &sheet),
    ];
    for (name, content) in parts {
        zip.start_file(name, options)
            .map_err(|e| WorkbookError(format!("{}: {}", name, e)))?;
        zip.write_all(content)
            .map_err(|e| WorkbookError(format!("{}: {}", name, e)))?;
    }

    let cursor = zip.finish().map_err(|e| WorkbookError(e.to_string()))?;
    Ok(cursor.into_inner())
}

fn workbook_xml() -> Result<Vec<u8>, WorkbookError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    emit(
        &mut writer,
        Event::Start(
            BytesStart::new("workbook")
                .with_attributes([("xmlns", SPREADSHEET_NS), ("xmlns:r", RELATIONSHIP_NS)]),
        ),
    )?;
    emit(&mut writer, Event::Start(BytesStart::new("sheets")))?;
    emit(
        &mut writer,
        Event::Empty(BytesStart::new("sheet").with_attributes([
            ("name", SHEET_NAME),
            ("sheetId", "1"),
            ("r:id", "rId1"),
        ])),
    )?;
    emit(&mut writer, Event::End(BytesEnd::new("sheets")))?;
    emit(&mut writer, Event::End(BytesEnd::new("workbook")))?;
    Ok(writer.into_inner().into_inner())
}

fn sheet_xml(rows: &[ExportRow], batch: bool) -> Result<Vec<u8>, WorkbookError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    emit(
        &mut writer,
        Event::Start(BytesStart::new("worksheet").with_attributes([("xmlns", SPREADSHEET_NS)])),
    )?;
    emit(&mut writer, Event::Start(BytesStart::new("sheetData")))?;

    let header: Vec<Cell> = headers(batch).into_iter().map(Cell::Text).collect();
    write_row(&mut writer, 1, &header)?;

    for (index, row) in rows.iter().enumerate() {
        let mut cells = vec![Cell::Number(row.chunk_id)];
        if batch {
            cells.push(Cell::Text(row.source_stem.as_deref().unwrap_or_default()));
        }
        cells.extend([
            Cell::Text(&row.data_reference),
            Cell::Text(&row.description),
            Cell::Text(&row.source_filename),
            Cell::Text(&row.text),
        ]);
        write_row(&mut writer, index + 2, &cells)?;
    }

    emit(&mut writer, Event::End(BytesEnd::new("sheetData")))?;
    emit(&mut writer, Event::End(BytesEnd::new("worksheet")))?;
    Ok(writer.into_inner().into_inner())
}

fn write_row(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    row_number: usize,
    cells: &[Cell],
) -> Result<(), WorkbookError> {
    let row_ref = row_number.to_string();
    emit(writer, Event::Start(BytesStart::new("row").with_attributes([("r", row_ref.as_str())])))?;

    for (col, cell) in cells.iter().enumerate() {
        let cell_ref = format!("{}{}", column_name(col), row_number);
        match cell {
            Cell::Number(value) => {
                emit(
                    writer,
                    Event::Start(BytesStart::new("c").with_attributes([("r", cell_ref.as_str())])),
                )?;
                emit(writer, Event::Start(BytesStart::new("v")))?;
                emit(writer, Event::Text(BytesText::new(&value.to_string())))?;
                emit(writer, Event::End(BytesEnd::new("v")))?;
            }
            Cell::Text(text) => {
                emit(
                    writer,
                    Event::Start(
                        BytesStart::new("c")
                            .with_attributes([("r", cell_ref.as_str()), ("t", "inlineStr")]),
                    ),
                )?;
                emit(writer, Event::Start(BytesStart::new("is")))?;
                emit(
                    writer,
                    Event::Start(BytesStart::new("t").with_attributes([("xml:space", "preserve")])),
                )?;
                emit(writer, Event::Text(BytesText::new(text)))?;
                emit(writer, Event::End(BytesEnd::new("t")))?;
                emit(writer, Event::End(BytesEnd::new("is")))?;
            }
        }
        emit(writer, Event::End(BytesEnd::new("c")))?;
    }

    emit(writer, Event::End(BytesEnd::new("row")))
}

fn emit(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<(), WorkbookError> {
    writer
        .write_event(event)
        .map_err(|e| WorkbookError(e.to_string()))
}

/// Zero-based column index to spreadsheet letters (0 → A, 26 → AA).
fn column_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}
