//! Filesystem-backed CSV tables and the flat-file submission log.

use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::common::error::{AttrResult, AttritionError};

use super::domain::{AttrValue, Cell, EmployeeRecord, EmployeeRepo, Table};

/// Read a CSV file with a header row.
pub fn read_table(path: &Path) -> AttrResult<Table> {
    let file = fs::File::open(path).map_err(|e| AttritionError::io(path, e))?;
    let table = parse_table(file, &path.display().to_string())?;
    debug!(path = %path.display(), rows = table.len(), "table loaded");
    Ok(table)
}

/// Parse CSV from any reader; `origin` only decorates error messages.
pub fn parse_table<R: Read>(reader: R, origin: &str) -> AttrResult<Table> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let columns: Vec<String> = rdr
        .headers()
        .map_err(|e| AttritionError::invalid(format!("{origin}: unreadable header: {e}")))?
        .iter()
        .map(|h| h.to_string())
        .collect();
    if columns.is_empty() || columns.iter().all(|c| c.is_empty()) {
        return Err(AttritionError::invalid(format!("{origin}: no data")));
    }

    let mut table = Table::new(columns);
    for (line, record) in rdr.records().enumerate() {
        let record = record
            .map_err(|e| AttritionError::invalid(format!("{origin}: parse error: {e}")))?;
        let row: Vec<Cell> = record.iter().map(AttrValue::parse).collect();
        table
            .push_row(row)
            .map_err(|e| AttritionError::invalid(format!("{origin}: line {}: {e}", line + 2)))?;
    }
    Ok(table)
}

/// Write `table` as CSV, creating parent directories as needed.
pub fn write_table(table: &Table, path: &Path) -> AttrResult<()> {
    ensure_parent(path)?;
    let file = fs::File::create(path).map_err(|e| AttritionError::io(path, e))?;
    write_rows(table, file, path)?;
    debug!(path = %path.display(), rows = table.len(), "table written");
    Ok(())
}

fn write_rows<W: Write>(table: &Table, writer: W, path: &Path) -> AttrResult<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(table.columns())
        .map_err(|e| csv_error(path, e))?;
    for row in table.rows() {
        wtr.write_record(row.iter().map(render_cell))
            .map_err(|e| csv_error(path, e))?;
    }
    wtr.flush().map_err(|e| AttritionError::io(path, e))?;
    Ok(())
}

/// Filesystem failures keep their I/O code; the rest are bad records.
fn csv_error(path: &Path, err: csv::Error) -> AttritionError {
    match err.into_kind() {
        csv::ErrorKind::Io(e) => AttritionError::io(path, e),
        other => AttritionError::invalid(format!("{}: write failed: {other:?}", path.display())),
    }
}

fn render_cell(cell: &Cell) -> String {
    cell.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

pub(crate) fn ensure_parent(path: &Path) -> AttrResult<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).map_err(|e| AttritionError::io(dir, e))
        }
        _ => Ok(()),
    }
}

/// Append-only CSV log of employee submissions.
pub struct CsvEmployeeLog {
    path: PathBuf,
    // Serialises appends from concurrent requests within this process.
    write_lock: Mutex<()>,
}

impl CsvEmployeeLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, records: &[EmployeeRecord]) -> AttrResult<()> {
        let _guard = self.write_lock.lock();
        ensure_parent(&self.path)?;
        let needs_header = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AttritionError::io(&self.path, e))?;

        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        let write_err = |e: csv::Error| csv_error(&self.path, e);
        if needs_header {
            wtr.write_record(EmployeeRecord::columns()).map_err(write_err)?;
        }
        for record in records {
            wtr.write_record(record.to_row().iter().map(render_cell))
                .map_err(write_err)?;
        }
        wtr.flush().map_err(|e| AttritionError::io(&self.path, e))?;
        Ok(())
    }
}

impl EmployeeRepo for CsvEmployeeLog {
    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }

    fn add_record(&self, record: &EmployeeRecord) -> AttrResult<()> {
        self.append(std::slice::from_ref(record))?;
        debug!(employee = record.employee_number, path = %self.path.display(), "record appended");
        Ok(())
    }

    fn bulk_ingest(&self, path: &Path) -> AttrResult<usize> {
        let records = EmployeeRecord::from_table(&read_table(path)?)?;
        self.append(&records)?;
        info!(count = records.len(), path = %self.path.display(), "records appended to flat file");
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::domain::tests::sample_raw;

    #[test]
    fn parses_missing_cells_and_types() {
        let csv = "A,B,C\n1,,Yes\n2.5,NaN,No\n";
        let table = parse_table(csv.as_bytes(), "inline").unwrap();
        assert_eq!(table.columns(), &["A", "B", "C"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0][1], None);
        assert_eq!(table.rows()[1][0], Some(AttrValue::Number(2.5)));
        assert_eq!(table.rows()[1][2], Some(AttrValue::Text("No".into())));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = parse_table("A,B\n1,2,3\n".as_bytes(), "inline").unwrap_err();
        assert!(err.to_string().contains("inline"));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(parse_table("".as_bytes(), "inline").is_err());
    }

    #[test]
    fn write_then_read_preserves_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.csv");
        let table = Table::from_rows(
            vec!["x".into(), "y".into()],
            vec![vec![Some(1.0.into()), None], vec![Some(2.0.into()), Some("b".into())]],
        )
        .unwrap();
        write_table(&table, &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "x,y\n1,\n2,b\n");
        assert_eq!(read_table(&path).unwrap(), table);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_table(Path::new("/no/such/file.csv")).unwrap_err();
        assert_eq!(err.code(), crate::common::error::ErrorCode::Io);
    }

    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("no space left on device"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::other("no space left on device"))
        }
    }

    #[test]
    fn write_failures_keep_io_code() {
        let table = Table::from_rows(vec!["x".into()], vec![vec![Some(1.0.into())]]).unwrap();
        let err = write_rows(&table, FullDisk, Path::new("out.csv")).unwrap_err();
        assert_eq!(err.code(), crate::common::error::ErrorCode::Io);
        assert_eq!(err.code().exit_code(), 8);
    }

    #[test]
    fn log_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = CsvEmployeeLog::new(dir.path().join("subs.csv"));
        let first = EmployeeRecord::from_record(&sample_raw(1)).unwrap();
        let second = EmployeeRecord::from_record(&sample_raw(2)).unwrap();
        log.add_record(&first).unwrap();
        log.add_record(&second).unwrap();

        let table = read_table(log.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.columns()[0], "EmployeeNumber");
        let parsed = EmployeeRecord::from_table(&table).unwrap();
        assert_eq!(parsed, vec![first, second]);
    }

    #[test]
    fn bulk_ingest_appends_every_row() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("results.csv");
        let log = CsvEmployeeLog::new(dir.path().join("subs.csv"));
        let staging = CsvEmployeeLog::new(&source);
        for n in 1..=3 {
            staging
                .add_record(&EmployeeRecord::from_record(&sample_raw(n)).unwrap())
                .unwrap();
        }
        assert_eq!(log.bulk_ingest(&source).unwrap(), 3);
        assert_eq!(read_table(log.path()).unwrap().len(), 3);
    }
}
