use log::{debug, info, warn};

use pairwise_survey::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::ingest::config_reader::*;

pub mod config_reader;
mod io_common;
mod sheet_legacy;
mod sheet_v2;

#[derive(Debug, Snafu)]
pub enum IngestError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON: {source}"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Payload must be a JSON object"))]
    NotAnObject {},
    #[snafu(display("Invalid v2 payload: {summary}"))]
    InvalidPayload { summary: String },
    #[snafu(display("schemaVersion {found} is older than the minimum accepted version {min}"))]
    OutdatedSchemaVersion { found: u32, min: u32 },
    #[snafu(display("minSchemaVersion {found} is lower than {min}"))]
    MinSchemaVersionTooLow { found: u32, min: u32 },
    #[snafu(display("Legacy payloads are not accepted"))]
    LegacyDisabled {},
    #[snafu(display("No output directory: use --out or set outputDirectory in the configuration"))]
    MissingOutputDirectory {},
    #[snafu(display("The normalize mode requires a survey definition (--schema)"))]
    MissingSchema {},
    #[snafu(display("Unknown mode {mode:?} (expected ingest, validate or normalize)"))]
    UnknownMode { mode: String },
    #[snafu(display("Invalid survey definition: {source}"))]
    InvalidSchema { source: SchemaError },
    #[snafu(display("Error creating directory {path}"))]
    CreatingDir {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error accessing sheet {path}"))]
    SheetIo {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening sheet {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading sheet {path}"))]
    CsvRead { source: csv::Error, path: String },
    #[snafu(display("Error writing sheet {path}"))]
    CsvWrite { source: csv::Error, path: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum RunMode {
    Ingest,
    Validate,
    Normalize,
}

impl RunMode {
    pub fn parse(mode: Option<&str>) -> IngestResult<RunMode> {
        match mode.unwrap_or("ingest") {
            "ingest" => Ok(RunMode::Ingest),
            "validate" => Ok(RunMode::Validate),
            "normalize" => Ok(RunMode::Normalize),
            x => UnknownModeSnafu { mode: x }.fail(),
        }
    }
}

pub fn read_json(path: &str) -> IngestResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    debug!("read_json: {} byte(s) from {}", contents.len(), path);
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(js)
}

fn read_registry(path: &str) -> IngestResult<SchemaRegistry> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    SchemaRegistry::from_json_str(&contents).context(InvalidSchemaSnafu {})
}

fn success(mode: &str, message: &str, response_id: String) -> SinkResponse {
    SinkResponse::Success {
        mode: mode.to_string(),
        message: message.to_string(),
        response_id,
    }
}

fn ingest_v2(
    js: &JSValue,
    dir: &Path,
    settings: &IngestSettings,
    timestamp: &str,
) -> IngestResult<SinkResponse> {
    let found = schema_version(js).unwrap_or(0);
    ensure!(
        found >= settings.min_schema_version,
        OutdatedSchemaVersionSnafu {
            found,
            min: settings.min_schema_version
        }
    );
    let errors = validate_value(js);
    if !errors.is_empty() {
        for e in errors.iter() {
            warn!("ingest_v2: {}", e);
        }
        let summary = errors
            .iter()
            .map(|e| e.message.clone())
            .collect::<Vec<String>>()
            .join(" | ");
        return InvalidPayloadSnafu { summary }.fail();
    }

    let response_id = fingerprint(js);
    let meta_path = dir.join(sheet_v2::META_SHEET);
    if io_common::contains_response(&meta_path, &response_id)? {
        info!("ingest_v2: response {} is already recorded", response_id);
        return Ok(success("v2", "Response already recorded", response_id));
    }

    let rows = sheet_v2::build_rows(js, &response_id, timestamp);
    // The meta row goes last: its presence marks the response as recorded.
    io_common::append_rows(
        &dir.join(sheet_v2::SECTIONS_SHEET),
        &sheet_v2::SECTION_HEADERS,
        &rows.sections,
    )?;
    io_common::append_rows(
        &dir.join(sheet_v2::COMPARISONS_SHEET),
        &sheet_v2::COMPARISON_HEADERS,
        &rows.comparisons,
    )?;
    io_common::append_rows(&meta_path, &sheet_v2::META_HEADERS, &[rows.meta])?;
    Ok(success("v2", "Response recorded", response_id))
}

fn ingest_legacy(
    payload: &LegacyPayload,
    dir: &Path,
    timestamp: &str,
) -> IngestResult<SinkResponse> {
    let response_id = payload.fingerprint();
    let path = dir.join(sheet_legacy::LEGACY_SHEET);
    if io_common::contains_response(&path, &response_id)? {
        info!("ingest_legacy: response {} is already recorded", response_id);
        return Ok(success("legacy", "Response already recorded", response_id));
    }
    let row = sheet_legacy::build_row(payload, &response_id, timestamp);
    io_common::append_rows(&path, &sheet_legacy::headers(), &[row])?;
    Ok(success("legacy", "Legacy response recorded", response_id))
}

/// Records one submission in the sheets of the output directory.
///
/// The response id is the fingerprint of the submission: a submission that
/// was already recorded is acknowledged again without writing anything.
pub fn ingest_value(
    js: JSValue,
    settings: &IngestSettings,
    now: &DateTime<Utc>,
) -> IngestResult<SinkResponse> {
    let dir = settings
        .output_directory
        .as_ref()
        .context(MissingOutputDirectorySnafu {})?;
    io_common::ensure_dir(dir)?;
    let timestamp = iso_timestamp(now);
    let incoming = IncomingPayload::detect(js).context(NotAnObjectSnafu {})?;
    info!("ingest_value: payload mode: {}", incoming.mode());
    match incoming {
        IncomingPayload::V2(js) => ingest_v2(&js, dir, settings, &timestamp),
        IncomingPayload::Legacy(payload) => {
            ensure!(settings.legacy_enabled, LegacyDisabledSnafu {});
            ingest_legacy(&payload, dir, &timestamp)
        }
    }
}

/// What the sink answers: failures are reported in the response, never
/// raised.
pub fn sink_response(res: IngestResult<SinkResponse>) -> SinkResponse {
    match res {
        Ok(r) => r,
        Err(e) => {
            warn!("sink_response: {}", e);
            SinkResponse::Error {
                message: e.to_string(),
            }
        }
    }
}

pub fn validation_report(js: JSValue) -> JSValue {
    match IncomingPayload::detect(js) {
        Some(IncomingPayload::V2(js)) => {
            let errors: Vec<JSValue> = validate_value(&js)
                .iter()
                .map(|e| json!({"path": e.path, "message": e.message}))
                .collect();
            json!({"mode": "v2", "valid": errors.is_empty(), "errors": errors})
        }
        // The legacy layout carries no definition to check against.
        Some(IncomingPayload::Legacy(_)) => {
            json!({"mode": "legacy", "valid": true, "errors": []})
        }
        None => json!({
            "mode": null,
            "valid": false,
            "errors": [{"path": "", "message": "Payload must be a JSON object"}]
        }),
    }
}

/// Maps the responses of a saved progress, an export or a submission onto
/// the current definition.
pub fn normalize_document(js: &JSValue, registry: &SchemaRegistry) -> IngestResult<JSValue> {
    let responses = js.get("responses").unwrap_or(&JSValue::Null);
    let res = normalize_responses(registry, responses);
    let warnings: Vec<JSValue> = res
        .warnings
        .iter()
        .map(|w| {
            let severity = match w.severity {
                NoteSeverity::Info => "info",
                NoteSeverity::Warning => "warning",
            };
            json!({
                "section": w.section_key,
                "field": w.field,
                "message": w.message,
                "severity": severity,
            })
        })
        .collect();
    let responses_js = serde_json::to_value(&res.responses).context(ParsingJsonSnafu {})?;
    Ok(json!({
        "surveyId": registry.snapshot().survey_id,
        "surveyVersion": registry.snapshot().survey_version,
        "responses": responses_js,
        "warnings": warnings,
    }))
}

fn check_reference(reference_path: &str, pretty_js: &str) -> IngestResult<()> {
    let reference = read_json(reference_path)?;
    let pretty_reference = serde_json::to_string_pretty(&reference).context(ParsingJsonSnafu {})?;
    if pretty_reference != pretty_js {
        warn!("Found differences with the reference string");
        print_diff(pretty_reference.as_str(), pretty_js, "\n");
        whatever!("Difference detected between the output and the reference output")
    }
    Ok(())
}

/// Runs one command and returns the document that was printed.
pub fn run(args: &Args, now: &DateTime<Utc>) -> IngestResult<JSValue> {
    let mode = RunMode::parse(args.mode.as_deref())?;
    let settings = read_settings(args.config.as_deref(), args.out.as_deref())?;
    info!("run: mode: {:?} settings: {:?}", mode, settings);
    let js = read_json(&args.input)?;

    let output = match mode {
        RunMode::Ingest => {
            let response = sink_response(ingest_value(js, &settings, now));
            serde_json::to_value(&response).context(ParsingJsonSnafu {})?
        }
        RunMode::Validate => validation_report(js),
        RunMode::Normalize => {
            let schema_path = args.schema.as_deref().context(MissingSchemaSnafu {})?;
            let registry = read_registry(schema_path)?;
            normalize_document(&js, &registry)?
        }
    };

    let pretty_js = serde_json::to_string_pretty(&output).context(ParsingJsonSnafu {})?;
    println!("{}", pretty_js);

    // The reference output, if provided for comparison
    if let Some(reference_path) = &args.reference {
        check_reference(reference_path, &pretty_js)?;
    }
    Ok(output)
}

#[cfg(test)]
fn test_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("data")
}

#[cfg(test)]
fn run_test(test_name: &str, mode: &str, schema: Option<&str>) -> JSValue {
    use chrono::TimeZone;

    let _ = env_logger::builder().is_test(true).try_init();
    let dir = test_dir().join(test_name);
    let out = std::env::temp_dir().join(format!("pwsurvey_{}", test_name));
    let _ = fs::remove_dir_all(&out);
    let path = |name: &str| dir.join(name).display().to_string();
    let args = Args {
        input: path("input.json"),
        mode: Some(mode.to_string()),
        schema: schema.map(path),
        out: Some(out.display().to_string()),
        config: None,
        reference: Some(path("expected.json")),
        verbose: false,
    };
    info!("Running test {}", test_name);
    let now = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();
    match run(&args, &now) {
        Ok(js) => js,
        Err(e) => panic!("test {} failed: {}", test_name, e),
    }
}

#[cfg(test)]
pub fn test_wrapper(test_name: &str) -> JSValue {
    run_test(test_name, "ingest", None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap()
    }

    fn settings(name: &str) -> IngestSettings {
        let out = std::env::temp_dir().join(format!("pwsurvey_unit_{}", name));
        let _ = fs::remove_dir_all(&out);
        IngestSettings::new(Some(out))
    }

    #[test]
    fn v2_econ() {
        let js = test_wrapper("v2_econ");
        assert_eq!(js["status"], "success");
        let out = std::env::temp_dir().join("pwsurvey_v2_econ");
        let sections = io_common::read_sheet(&out.join(sheet_v2::SECTIONS_SHEET));
        assert_eq!(sections.len(), 2);
        let comparisons = io_common::read_sheet(&out.join(sheet_v2::COMPARISONS_SHEET));
        assert_eq!(comparisons.len(), 6);
    }

    #[test]
    fn v2_same_extremes() {
        let js = test_wrapper("v2_same_extremes");
        assert_eq!(js["status"], "error");
        let out = std::env::temp_dir().join("pwsurvey_v2_same_extremes");
        assert!(!out.join(sheet_v2::META_SHEET).exists());
    }

    #[test]
    fn legacy_basic() {
        let js = test_wrapper("legacy_basic");
        assert_eq!(js["mode"], "legacy");
        let out = std::env::temp_dir().join("pwsurvey_legacy_basic");
        let sheet = io_common::read_sheet(&out.join(sheet_legacy::LEGACY_SHEET));
        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet[0].len(), 73);
        assert_eq!(sheet[1].len(), 73);
    }

    #[test]
    fn validate_report() {
        run_test("validate_report", "validate", None);
    }

    #[test]
    fn normalize_progress() {
        run_test("normalize_progress", "normalize", Some("schema.json"));
    }

    #[test]
    fn ingesting_twice_appends_once() {
        let settings = settings("twice");
        let js = read_json(&test_dir().join("v2_econ").join("input.json").display().to_string())
            .unwrap();
        let first = ingest_value(js.clone(), &settings, &now()).unwrap();
        let second = ingest_value(js, &settings, &now()).unwrap();
        match (first, second) {
            (
                SinkResponse::Success {
                    response_id: id1,
                    message: m1,
                    ..
                },
                SinkResponse::Success {
                    response_id: id2,
                    message: m2,
                    ..
                },
            ) => {
                assert_eq!(id1, id2);
                assert_eq!(m1, "Response recorded");
                assert_eq!(m2, "Response already recorded");
            }
            other => panic!("unexpected {:?}", other),
        }
        let dir = settings.output_directory.unwrap();
        assert_eq!(io_common::read_sheet(&dir.join(sheet_v2::META_SHEET)).len(), 2);
        assert_eq!(
            io_common::read_sheet(&dir.join(sheet_v2::SECTIONS_SHEET)).len(),
            2
        );
    }

    #[test]
    fn legacy_can_be_refused() {
        let mut settings = settings("refused");
        settings.legacy_enabled = false;
        let res = ingest_value(json!({"responses": {}}), &settings, &now());
        assert!(matches!(res, Err(IngestError::LegacyDisabled {})));
        let response = sink_response(res);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"status": "error", "message": "Legacy payloads are not accepted"})
        );
    }

    #[test]
    fn outdated_version_is_refused() {
        let mut settings = settings("outdated");
        settings.min_schema_version = 3;
        let res = ingest_value(
            json!({"schemaVersion": "2", "responses": {}}),
            &settings,
            &now(),
        );
        assert!(matches!(
            res,
            Err(IngestError::OutdatedSchemaVersion { found: 2, min: 3 })
        ));
    }

    #[test]
    fn not_an_object() {
        let res = ingest_value(json!([1, 2]), &settings("array"), &now());
        assert!(matches!(res, Err(IngestError::NotAnObject {})));
        assert_eq!(validation_report(json!("x"))["valid"], false);
    }

    #[test]
    fn modes() {
        assert_eq!(RunMode::parse(None).unwrap(), RunMode::Ingest);
        assert_eq!(RunMode::parse(Some("normalize")).unwrap(), RunMode::Normalize);
        assert!(RunMode::parse(Some("tabulate")).is_err());
    }
}
