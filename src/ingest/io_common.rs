// Primitives for the CSV sheets.

use std::fs::{self, OpenOptions};

use crate::ingest::*;

/// Column of the response id in every sheet.
pub const RESPONSE_ID_COLUMN: usize = 1;

pub fn ensure_dir(dir: &Path) -> IngestResult<()> {
    let path = dir.display().to_string();
    fs::create_dir_all(dir).context(CreatingDirSnafu { path })
}

/// The response id is already present in the sheet. A sheet that does not
/// exist yet contains nothing.
pub fn contains_response(path: &Path, response_id: &str) -> IngestResult<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let p = path.display().to_string();
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path: p.clone() })?;
    for (idx, line_r) in rdr.records().enumerate() {
        let line = line_r.context(CsvReadSnafu { path: p.clone() })?;
        if line.get(RESPONSE_ID_COLUMN) == Some(response_id) {
            debug!("contains_response: found {} at row {}", response_id, idx + 2);
            return Ok(true);
        }
    }
    Ok(false)
}

/// Appends rows to a sheet, writing the header first when the sheet is new
/// or empty.
pub fn append_rows<H: AsRef<[u8]>>(
    path: &Path,
    headers: &[H],
    rows: &[Vec<String>],
) -> IngestResult<()> {
    let p = path.display().to_string();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context(SheetIoSnafu { path: p.clone() })?;
    let is_empty = file
        .metadata()
        .context(SheetIoSnafu { path: p.clone() })?
        .len()
        == 0;
    let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(file);
    if is_empty {
        debug!("append_rows: writing headers of {}", p);
        wtr.write_record(headers)
            .context(CsvWriteSnafu { path: p.clone() })?;
    }
    for row in rows.iter() {
        wtr.write_record(row)
            .context(CsvWriteSnafu { path: p.clone() })?;
    }
    wtr.flush().context(SheetIoSnafu { path: p.clone() })?;
    info!("append_rows: {} row(s) appended to {}", rows.len(), p);
    Ok(())
}

/// The string value of a field, empty when absent or not a string.
pub fn text<'a>(js: &'a JSValue, name: &str) -> &'a str {
    js.get(name).and_then(|v| v.as_str()).unwrap_or("")
}

/// Reads a whole sheet, header included. Used to check what was written.
#[cfg(test)]
pub fn read_sheet(path: &Path) -> Vec<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .unwrap();
    rdr.records()
        .map(|r| r.unwrap().iter().map(|s| s.to_string()).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_written_once() {
        let dir = std::env::temp_dir().join("pwsurvey_io_common");
        let _ = fs::remove_dir_all(&dir);
        ensure_dir(&dir).unwrap();
        let path = dir.join("sheet.csv");
        let headers = ["Timestamp", "ResponseID", "Value"];
        let row = |id: &str| vec!["t".to_string(), id.to_string(), "a, b".to_string()];

        assert!(!contains_response(&path, "r1").unwrap());
        append_rows(&path, &headers, &[row("r1")]).unwrap();
        append_rows(&path, &headers, &[row("r2"), row("r3")]).unwrap();
        assert!(contains_response(&path, "r1").unwrap());
        assert!(contains_response(&path, "r3").unwrap());
        assert!(!contains_response(&path, "ResponseID").unwrap());

        let sheet = read_sheet(&path);
        assert_eq!(sheet.len(), 4);
        assert_eq!(sheet[0], headers.to_vec());
        assert_eq!(sheet[1][2], "a, b");
    }
}
