use std::fs;
use std::path::PathBuf;

use crate::errors::ReportError;
use crate::model::{DeviceSerial, SignalDirection, TestSpec, SETUP_FIELDS};
use crate::{decode_report, extract_report, extract_str};

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data")
        .join(name)
}

fn fixture(name: &str) -> String {
    let full_path = fixture_path(name);
    fs::read_to_string(&full_path)
        .unwrap_or_else(|err| panic!("failed to read fixture {}: {}", full_path.display(), err))
}

fn tx_spec() -> TestSpec {
    TestSpec::peak_to_peak(SignalDirection::Tx)
}

#[test]
fn extracts_tx_peak_to_peak_record() {
    let record = extract_report(
        &fixture_path("elevated_full.xml"),
        &tx_spec(),
        SignalDirection::Tx,
    )
    .expect("Tx extraction failed");

    assert_eq!(record.serial.as_str(), "001_002");
    assert_eq!(record.text("Operator"), Some("jdoe"));
    assert_eq!(record.text("OverallResult"), Some("Passed"));
    assert_eq!(record.text("TestResult"), Some("Passed"));

    let values = record.measurement_values();
    assert_eq!(values.len(), 6);
    assert!(values.iter().all(|v| v.is_some_and(f64::is_finite)));
    assert_eq!(record.measurement("Tx Element[3]"), Some(98.75));

    let names: Vec<&str> = record.measurements.iter().map(|(n, _)| n.as_str()).collect();
    let expected: Vec<String> = (0..6).map(|i| format!("Tx Element[{i}]")).collect();
    assert_eq!(names, expected);
}

#[test]
fn text_columns_keep_document_order_before_boundary() {
    let content = fixture("elevated_full.xml");
    let record = extract_str(&content, &tx_spec(), SignalDirection::Tx).expect("extract");

    let names: Vec<&str> = record.text_fields.iter().map(|(n, _)| n.as_str()).collect();
    let mut expected: Vec<&str> = SETUP_FIELDS.to_vec();
    expected.extend(["OverallResult", "TestResult", "Tx Units"]);
    assert_eq!(names, expected);
    assert_eq!(record.text("Tx Units"), Some("mV"));
}

#[test]
fn selects_group_by_measurement_label() {
    let content = fixture("elevated_full.xml");
    let spec = TestSpec::new("Tx Element Peak-Peak", "Mean");
    let record = extract_str(&content, &spec, SignalDirection::Tx).expect("extract");

    assert_eq!(record.measurement_values(), vec![Some(50.0)]);
}

#[test]
fn empty_rx_value_becomes_null() {
    let content = fixture("elevated_full.xml");
    let spec = TestSpec::peak_to_peak(SignalDirection::Rx);
    let record = extract_str(&content, &spec, SignalDirection::Rx).expect("Rx extraction failed");

    assert_eq!(record.text("TestResult"), Some("Failed"));
    assert_eq!(
        record.measurement_values(),
        vec![Some(12.5), None, Some(13.0)]
    );
}

#[test]
fn accepts_namespaced_reports() {
    let content = fixture("namespaced.xml");
    let record = extract_str(&content, &tx_spec(), SignalDirection::Tx).expect("extract");

    assert_eq!(record.serial.as_str(), "003_004");
    assert_eq!(record.measurement_values(), vec![Some(1.0), Some(2.0)]);
}

#[test]
fn missing_entry_is_no_match() {
    let content = fixture("elevated_full.xml");
    let spec = TestSpec::new("Gain Flatness", "dB");
    let err = extract_str(&content, &spec, SignalDirection::Tx).expect_err("should not match");

    assert!(err.is_no_match());
    assert!(matches!(err, ReportError::NoMatch { ref test, .. } if test == "Gain Flatness"));
}

#[test]
fn unknown_measurement_label_is_no_match() {
    let content = fixture("elevated_full.xml");
    let spec = TestSpec::new("Tx Element Peak-Peak", "RMS");
    let err = extract_str(&content, &spec, SignalDirection::Tx).expect_err("should not match");

    assert!(err.is_no_match());
}

#[test]
fn missing_product_sn_is_schema_error() {
    let content = fixture("elevated_full.xml")
        .replace("<ProductSN>R0EQLE01-001_002</ProductSN>", "");
    let err = extract_str(&content, &tx_spec(), SignalDirection::Tx).expect_err("schema error");

    assert!(!err.is_no_match());
    assert!(matches!(err, ReportError::MissingField { field: "ProductSN" }));
}

#[test]
fn empty_product_sn_is_schema_error() {
    let content = fixture("elevated_full.xml").replace(
        "<ProductSN>R0EQLE01-001_002</ProductSN>",
        "<ProductSN></ProductSN>",
    );
    let err = extract_str(&content, &tx_spec(), SignalDirection::Tx).expect_err("schema error");

    assert!(matches!(err, ReportError::MissingField { field: "ProductSN" }));
}

#[test]
fn missing_setup_field_is_schema_error() {
    let content = fixture("elevated_full.xml").replace("<Operator>jdoe</Operator>", "");
    let err = extract_str(&content, &tx_spec(), SignalDirection::Tx).expect_err("schema error");

    assert!(matches!(err, ReportError::MissingField { field: "Operator" }));
}

#[test]
fn short_serial_fails_loudly() {
    let content = fixture("elevated_full.xml").replace(
        "<ProductSN>R0EQLE01-001_002</ProductSN>",
        "<ProductSN>01_02</ProductSN>",
    );
    let err = extract_str(&content, &tx_spec(), SignalDirection::Tx).expect_err("schema error");

    assert!(matches!(err, ReportError::InvalidSerial { .. }));
}

#[test]
fn missing_boundary_column_is_schema_error() {
    let content = fixture("elevated_full.xml");
    let err = extract_str(&content, &tx_spec(), SignalDirection::Rx).expect_err("schema error");

    match err {
        ReportError::MissingBoundary { column, .. } => assert_eq!(column, "Rx Element[0]"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn non_numeric_measurement_is_rejected() {
    let content = fixture("elevated_full.xml").replace(
        r#"<Value Record="Tx Element[4]">102.0</Value>"#,
        r#"<Value Record="Tx Element[4]">open</Value>"#,
    );
    let err = extract_str(&content, &tx_spec(), SignalDirection::Tx).expect_err("schema error");

    assert!(matches!(
        err,
        ReportError::InvalidMeasurement { ref column, ref value }
            if column == "Tx Element[4]" && value == "open"
    ));
}

#[test]
fn malformed_xml_is_reported() {
    let err = extract_str("<Report><Setup>", &tx_spec(), SignalDirection::Tx)
        .expect_err("xml error");

    assert!(matches!(err, ReportError::Xml(_)));
}

#[test]
fn unreadable_file_is_io_error() {
    let err = extract_report(
        &fixture_path("does_not_exist.xml"),
        &tx_spec(),
        SignalDirection::Tx,
    )
    .expect_err("io error");

    assert!(matches!(err, ReportError::Io { .. }));
}

#[test]
fn serial_takes_trailing_characters() {
    let serial = DeviceSerial::from_product_sn("  LOT42-009_013 ").expect("serial");
    assert_eq!(serial.as_str(), "009_013");

    assert!(DeviceSerial::from_product_sn("123456").is_err());
}

#[test]
fn test_spec_keys_and_directions() {
    assert_eq!(tx_spec().key(), "Tx Element Peak-Peak___Pk-Pk");
    assert_eq!(
        TestSpec::peak_to_peak(SignalDirection::Rx).key(),
        "Rx Element Peak-Peak___Pk-Pk"
    );
    assert_eq!(SignalDirection::try_from(" RX "), Ok(SignalDirection::Rx));
    assert!(SignalDirection::try_from("tx/rx").is_err());
    assert_eq!(SignalDirection::Tx.boundary_column(), "Tx Element[0]");
}

#[test]
fn latin1_report_follows_declared_encoding() {
    let record = extract_report(
        &fixture_path("elevated_latin1.xml"),
        &tx_spec(),
        SignalDirection::Tx,
    )
    .expect("Latin-1 extraction failed");

    assert_eq!(record.text("Operator"), Some("J\u{b5}rgen"));
    assert_eq!(record.text("Tx Units"), Some("\u{b0}C"));
    assert_eq!(record.measurement("Tx Element[0]"), Some(101.5));
}

#[test]
fn utf16_report_is_decoded_from_its_bom() {
    let text = fixture("namespaced.xml");
    let mut bytes = vec![0xFF, 0xFE];
    bytes.extend(text.encode_utf16().flat_map(u16::to_le_bytes));

    let decoded = decode_report(&bytes).expect("decode");
    let record = extract_str(&decoded, &tx_spec(), SignalDirection::Tx).expect("extract");

    assert_eq!(record.serial.as_str(), "003_004");
}

#[test]
fn undeclared_non_utf8_bytes_are_rejected() {
    let bytes = b"<Report><Setup><Operator>J\xb5rgen</Operator></Setup></Report>";
    let err = decode_report(bytes).expect_err("not utf-8");

    assert!(matches!(err, ReportError::Decode { encoding: "UTF-8" }));
}

#[test]
fn unknown_declared_encoding_is_rejected() {
    let bytes = br#"<?xml version="1.0" encoding="x-made-up"?><Report/>"#;
    let err = decode_report(bytes).expect_err("unknown label");

    assert!(matches!(err, ReportError::UnknownEncoding { ref label } if label == "x-made-up"));
}

#[test]
fn missing_test_wins_over_missing_summary() {
    let content = fixture("elevated_full.xml").replace(
        "<Summary>\n    <OverallResult>Passed</OverallResult>\n  </Summary>",
        "",
    );
    assert!(!content.contains("<Summary>"));

    let spec = TestSpec::new("Gain Flatness", "dB");
    let err = extract_str(&content, &spec, SignalDirection::Tx).expect_err("should not match");
    assert!(err.is_no_match());

    let err = extract_str(&content, &tx_spec(), SignalDirection::Tx).expect_err("schema error");
    assert!(matches!(
        err,
        ReportError::MissingField { field: "Summary/OverallResult" }
    ));
}
