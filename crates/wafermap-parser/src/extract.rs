use std::borrow::Cow;
use std::fs;
use std::path::Path;

use encoding_rs::{Encoding, UTF_8};
use roxmltree::{Document, Node, ParsingOptions};

use crate::errors::ReportError;
use crate::model::{
    DeviceRecord, DeviceSerial, SignalDirection, TestSpec, OVERALL_RESULT, SETUP_FIELDS,
    TEST_RESULT,
};

type TextColumn = (String, Option<String>);

/// Reads a die test report from disk and extracts one record for `spec`.
pub fn extract_report(
    path: &Path,
    spec: &TestSpec,
    direction: SignalDirection,
) -> Result<DeviceRecord, ReportError> {
    let bytes = fs::read(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let content = decode_report(&bytes)?;
    extract_str(&content, spec, direction)
}

/// Decodes raw report bytes to text. A byte order mark wins, then the
/// `encoding` named in the XML declaration, then UTF-8.
pub fn decode_report(bytes: &[u8]) -> Result<Cow<'_, str>, ReportError> {
    let (encoding, body) = match Encoding::for_bom(bytes) {
        Some((encoding, bom_len)) => (encoding, &bytes[bom_len..]),
        None => match declared_encoding(bytes) {
            Some(label) => {
                let encoding = Encoding::for_label(label.as_bytes())
                    .ok_or(ReportError::UnknownEncoding { label })?;
                // The declaration was readable as ASCII, so a UTF-16 label is wrong.
                (encoding.output_encoding(), bytes)
            }
            None => (UTF_8, bytes),
        },
    };
    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .ok_or(ReportError::Decode {
            encoding: encoding.name(),
        })
}

/// `encoding="..."` pseudo-attribute of an ASCII-compatible XML declaration.
fn declared_encoding(bytes: &[u8]) -> Option<String> {
    let head = bytes.strip_prefix(b"<?xml")?;
    let end = head.windows(2).position(|pair| pair == b"?>")?;
    let declaration = std::str::from_utf8(&head[..end]).ok()?;
    let (_, rest) = declaration.split_once("encoding")?;
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let (label, _) = rest[1..].split_once(quote)?;
    Some(label.trim().to_string())
}

/// Extracts one record from an in-memory report document.
///
/// A report without the requested test is a `NoMatch` before any other
/// field is checked.
pub fn extract_str(
    content: &str,
    spec: &TestSpec,
    direction: SignalDirection,
) -> Result<DeviceRecord, ReportError> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(content.trim_start_matches('\u{feff}'), options)?;
    let root = doc.root_element();

    let (entry, group) = find_test(root, spec).ok_or_else(|| ReportError::NoMatch {
        test: spec.name.clone(),
        measurement: spec.measurement.clone(),
    })?;

    let mut text_fields = read_setup(root)?;
    let product_sn = text_fields
        .iter()
        .find(|(field, _)| field == "ProductSN")
        .and_then(|(_, value)| value.as_deref())
        .ok_or(ReportError::MissingField { field: "ProductSN" })?;
    let serial = DeviceSerial::from_product_sn(product_sn)?;

    let overall = child(root, "Summary")
        .and_then(|summary| child(summary, OVERALL_RESULT))
        .ok_or(ReportError::MissingField {
            field: "Summary/OverallResult",
        })?;
    text_fields.push((OVERALL_RESULT.to_string(), node_text(overall)));

    let result = child(entry, "Result").ok_or_else(|| ReportError::MissingTestResult {
        test: spec.name.clone(),
    })?;
    text_fields.push((TEST_RESULT.to_string(), node_text(result)));

    let mut records = read_records(group, spec)?;
    let boundary = direction.boundary_column();
    let split = records
        .iter()
        .position(|(column, _)| *column == boundary)
        .ok_or_else(|| ReportError::MissingBoundary {
            column: boundary.clone(),
            test: spec.name.clone(),
        })?;
    let numeric = records.split_off(split);
    text_fields.extend(records);

    let measurements = numeric
        .into_iter()
        .map(|(column, value)| {
            let parsed = parse_measurement(&column, value.as_deref())?;
            Ok((column, parsed))
        })
        .collect::<Result<Vec<_>, ReportError>>()?;

    Ok(DeviceRecord {
        serial,
        text_fields,
        measurements,
    })
}

fn read_setup(root: Node<'_, '_>) -> Result<Vec<TextColumn>, ReportError> {
    let setup = child(root, "Setup").ok_or(ReportError::MissingField { field: "Setup" })?;
    let mut fields = Vec::with_capacity(SETUP_FIELDS.len() + 2);
    for field in SETUP_FIELDS {
        let node = child(setup, field).ok_or(ReportError::MissingField { field })?;
        fields.push((field.to_string(), node_text(node)));
    }
    Ok(fields)
}

/// Finds the `Detail/Entry` named after the test and its `Group` carrying the
/// requested measurement label. The first match in document order wins.
fn find_test<'a, 'input>(
    root: Node<'a, 'input>,
    spec: &TestSpec,
) -> Option<(Node<'a, 'input>, Node<'a, 'input>)> {
    let detail = child(root, "Detail")?;
    detail
        .children()
        .filter(|node| is_element(node, "Entry"))
        .filter(|entry| child_text_eq(*entry, "Name", &spec.name))
        .find_map(|entry| {
            entry
                .children()
                .filter(|node| is_element(node, "Group"))
                .find(|group| child_text_eq(*group, "Measurement", &spec.measurement))
                .map(|group| (entry, group))
        })
}

/// Collects `Record/Value` leaves in document order. A repeated record name
/// keeps its first position and takes the later value.
fn read_records(group: Node<'_, '_>, spec: &TestSpec) -> Result<Vec<TextColumn>, ReportError> {
    let mut columns: Vec<TextColumn> = Vec::new();
    let values = group
        .children()
        .filter(|node| is_element(node, "Record"))
        .flat_map(|record| record.children().filter(|node| is_element(node, "Value")));

    for (index, value) in values.enumerate() {
        let name = value
            .attribute("Record")
            .ok_or_else(|| ReportError::UnnamedRecord {
                test: spec.name.clone(),
                index,
            })?;
        let text = node_text(value);
        match columns.iter_mut().find(|(column, _)| column == name) {
            Some(existing) => existing.1 = text,
            None => columns.push((name.to_string(), text)),
        }
    }

    Ok(columns)
}

fn parse_measurement(column: &str, value: Option<&str>) -> Result<Option<f64>, ReportError> {
    let Some(raw) = value else {
        return Ok(None);
    };
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| ReportError::InvalidMeasurement {
            column: column.to_string(),
            value: raw.to_string(),
        })
}

fn is_element(node: &Node<'_, '_>, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|candidate| is_element(candidate, name))
}

fn child_text_eq(node: Node<'_, '_>, name: &str, expected: &str) -> bool {
    child(node, name)
        .and_then(|found| found.text())
        .is_some_and(|text| text.trim() == expected)
}

fn node_text(node: Node<'_, '_>) -> Option<String> {
    node.text()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}
