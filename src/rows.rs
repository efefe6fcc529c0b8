//! Tabular file decoding.
//!
//! Turns an uploaded file into a header row plus data rows. Decoding is
//! pluggable by file kind: delimited text goes through the `csv` crate,
//! spreadsheet binaries (`.xlsx`) are read directly from the OOXML ZIP with
//! bounded entry reads. Both produce the same [`TabularFile`] so the
//! ingestion pipeline never cares where the rows came from.

use std::io::Read;
use std::path::Path;

use anyhow::Context;

use crate::error::{CatalogError, Result};

/// Maximum rows read from a single worksheet.
const XLSX_MAX_ROWS: usize = 100_000;
/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb
/// protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Recognized tabular file kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    DelimitedText,
    Spreadsheet,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::DelimitedText => "delimited-text",
            FileKind::Spreadsheet => "spreadsheet",
        }
    }
}

/// A decoded tabular file: one header row plus zero or more data rows.
#[derive(Debug, Clone)]
pub struct TabularFile {
    pub file_name: String,
    pub kind: FileKind,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Decode a tabular file by extension.
///
/// Fails fast with `BadInput` when the extension is unrecognized, the file
/// cannot be read, there is no header row, or the header has zero columns.
pub fn read_tabular(path: &Path) -> Result<TabularFile> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let (kind, parsed) = match extension.as_str() {
        "csv" => (FileKind::DelimitedText, read_delimited(path, b',')?),
        "tsv" => (FileKind::DelimitedText, read_delimited(path, b'\t')?),
        "xlsx" => (FileKind::Spreadsheet, read_xlsx(path)?),
        other => {
            return Err(CatalogError::bad_input(format!(
                "unrecognized file kind '{other}' for {file_name}; expected csv, tsv or xlsx"
            )))
        }
    };

    let (headers, rows) = parsed;
    if headers.is_empty() {
        return Err(CatalogError::bad_input(format!(
            "{file_name} has no header row"
        )));
    }
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(CatalogError::bad_input(format!(
            "{file_name} has zero usable columns"
        )));
    }

    Ok(TabularFile {
        file_name,
        kind,
        headers,
        rows,
    })
}

type ParsedRows = (Vec<String>, Vec<Vec<String>>);

fn read_delimited(path: &Path, delimiter: u8) -> Result<ParsedRows> {
    let file = std::fs::File::open(path)
        .map_err(|e| CatalogError::bad_input(format!("cannot read {}: {e}", path.display())))?;
    // Headers are read as a plain record so blank header cells survive for
    // placeholder-key synthesis.
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let mut records = reader.records();
    let headers: Vec<String> = match records.next() {
        Some(record) => record
            .with_context(|| format!("malformed delimited data in {}", path.display()))?
            .iter()
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    };

    let mut rows = Vec::new();
    for record in records {
        let record =
            record.with_context(|| format!("malformed delimited data in {}", path.display()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok((headers, rows))
}

fn read_xlsx(path: &Path) -> Result<ParsedRows> {
    let bytes = std::fs::read(path)
        .map_err(|e| CatalogError::bad_input(format!("cannot read {}: {e}", path.display())))?;
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.as_slice()))
        .map_err(|e| CatalogError::bad_input(format!("{} is not an xlsx archive: {e}", path.display())))?;

    let shared_strings = read_shared_strings(&mut archive)?;
    let sheet = first_worksheet_name(&mut archive)?;
    let sheet_xml = read_zip_entry_bounded(&mut archive, &sheet)?;
    let mut rows = parse_sheet_rows(&sheet_xml, &shared_strings)?;

    if rows.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }
    let headers = rows.remove(0);
    Ok((headers, rows))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>> {
    let entry = archive
        .by_name(name)
        .map_err(|e| CatalogError::bad_input(format!("xlsx entry {name} missing: {e}")))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .context("reading xlsx entry")?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(CatalogError::bad_input(format!(
            "xlsx entry {name} exceeds size limit"
        )));
    }
    Ok(out)
}

fn first_worksheet_name(archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>) -> Result<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
        .into_iter()
        .next()
        .ok_or_else(|| CatalogError::bad_input("xlsx has no worksheets".to_string()))
}

fn read_shared_strings(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>> {
    // Shared strings are optional; purely numeric sheets omit the part.
    if !archive.file_names().any(|n| n == "xl/sharedStrings.xml") {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml")?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    let mut in_text = false;
    let mut current = String::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = true;
                    current.clear();
                } else if in_si && e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_text => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = false;
                } else if e.local_name().as_ref() == b"si" {
                    in_si = false;
                    in_text = false;
                    strings.push(std::mem::take(&mut current));
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => {
                return Err(CatalogError::bad_input(format!(
                    "malformed sharedStrings.xml: {e}"
                )))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Convert the letter part of a cell reference (`B7` -> column 1).
fn column_index(cell_ref: &str) -> Option<usize> {
    let letters: String = cell_ref.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    if letters.is_empty() {
        return None;
    }
    let mut index = 0usize;
    for c in letters.chars() {
        index = index * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }
    Some(index - 1)
}

fn parse_sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<Vec<Vec<String>>> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut current_row: Vec<String> = Vec::new();
    let mut in_row = false;
    let mut in_value = false;
    let mut in_inline_text = false;
    let mut cell_column: Option<usize> = None;
    let mut cell_is_shared = false;
    let mut next_column = 0usize;

    loop {
        if rows.len() >= XLSX_MAX_ROWS {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    in_row = true;
                    current_row.clear();
                    next_column = 0;
                }
                b"c" if in_row => {
                    cell_is_shared = false;
                    cell_column = None;
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"r" => {
                                let cell_ref = String::from_utf8_lossy(attr.value.as_ref()).into_owned();
                                cell_column = column_index(&cell_ref);
                            }
                            b"t" => {
                                cell_is_shared = attr.value.as_ref() == b"s";
                            }
                            _ => {}
                        }
                    }
                }
                b"v" if in_row => in_value = true,
                b"t" if in_row => in_inline_text = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_value || in_inline_text => {
                let raw = te.unescape().unwrap_or_default().into_owned();
                let text = if in_value && cell_is_shared {
                    raw.trim()
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| shared_strings.get(i).cloned())
                        .unwrap_or_default()
                } else {
                    raw
                };
                let column = cell_column.unwrap_or(next_column);
                if current_row.len() <= column {
                    current_row.resize(column + 1, String::new());
                }
                current_row[column] = text;
                next_column = column + 1;
                in_value = false;
                in_inline_text = false;
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"row" => {
                    in_row = false;
                    rows.push(std::mem::take(&mut current_row));
                }
                b"v" => in_value = false,
                b"t" => in_inline_text = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => {
                return Err(CatalogError::bad_input(format!(
                    "malformed worksheet xml: {e}"
                )))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}
