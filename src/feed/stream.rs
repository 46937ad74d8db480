//! Lazy row-by-row reader over a single GTFS table.
//!
//! A [`RecordStream`] wraps any byte reader, reads the header eagerly and then
//! yields one [`Row`] per data record. Row numbers follow the file: the header
//! is row 1, so the first data row is row 2.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use thiserror::Error;

const BYTE_ORDER_MARK: char = '\u{feff}';

/// Errors surfaced while reading rows.
///
/// `Malformed` affects a single row and callers may skip it; `Io` means the
/// underlying reader failed and the stream cannot continue.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("{table}: row {row}: {message}")]
    Malformed {
        table: String,
        row: u64,
        message: String,
    },
    #[error("{table}: read error: {source}")]
    Io {
        table: String,
        #[source]
        source: std::io::Error,
    },
}

/// Column names of a table, shared by every row of one stream.
#[derive(Debug)]
pub struct Header {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl Header {
    fn new(names: Vec<String>) -> Self {
        let mut positions = HashMap::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            positions.entry(name.clone()).or_insert(idx);
        }
        Self { names, positions }
    }

    /// Column names in file order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Position of a column, if the header has it.
    pub fn position(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.positions.contains_key(column)
    }
}

/// One data row: column values in header order plus the row number.
#[derive(Debug, Clone)]
pub struct Row {
    number: u64,
    header: Arc<Header>,
    values: Vec<String>,
}

impl Row {
    fn new(number: u64, header: Arc<Header>, record: &csv::StringRecord) -> Self {
        let width = header.names.len();
        let mut values: Vec<String> = record.iter().take(width).map(str::to_owned).collect();
        // Short rows read as empty trailing fields.
        values.resize(width, String::new());
        Self {
            number,
            header,
            values,
        }
    }

    /// 1-based row number within the table (the header is row 1).
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Raw value of a column. `None` when the header has no such column.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.header
            .position(column)
            .map(|idx| self.values[idx].as_str())
    }

    /// Iterate `(column, value)` pairs in header order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.header
            .names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }

    pub fn header(&self) -> &Header {
        &self.header
    }
}

/// Streaming reader over one table.
pub struct RecordStream {
    table: String,
    reader: csv::Reader<Box<dyn Read + Send>>,
    header: Arc<Header>,
    record: csv::StringRecord,
    next_row: u64,
    finished: bool,
}

impl RecordStream {
    /// Create a stream over `input`, reading the header immediately.
    pub fn new(table: impl Into<String>, input: Box<dyn Read + Send>) -> Result<Self, StreamError> {
        let table = table.into();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(input);

        let names = match reader.headers() {
            Ok(record) => record
                .iter()
                .enumerate()
                .map(|(idx, name)| {
                    let name = if idx == 0 {
                        name.trim_start_matches(BYTE_ORDER_MARK)
                    } else {
                        name
                    };
                    name.trim().to_string()
                })
                .collect(),
            Err(err) => return Err(classify(&table, 1, err)),
        };

        Ok(Self {
            table,
            reader,
            header: Arc::new(Header::new(names)),
            record: csv::StringRecord::new(),
            next_row: 2,
            finished: false,
        })
    }

    /// Name of the table this stream reads.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Header column names, with any byte-order mark removed.
    pub fn headers(&self) -> &[String] {
        self.header.names()
    }

    pub fn header(&self) -> &Header {
        &self.header
    }
}

impl Iterator for RecordStream {
    type Item = Result<Row, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let number = self.next_row;
        match self.reader.read_record(&mut self.record) {
            Ok(true) => {
                self.next_row += 1;
                Some(Ok(Row::new(number, Arc::clone(&self.header), &self.record)))
            }
            Ok(false) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.next_row += 1;
                let err = classify(&self.table, number, err);
                if matches!(err, StreamError::Io { .. }) {
                    self.finished = true;
                }
                Some(Err(err))
            }
        }
    }
}

fn classify(table: &str, row: u64, err: csv::Error) -> StreamError {
    if err.is_io_error() {
        if let csv::ErrorKind::Io(source) = err.into_kind() {
            return StreamError::Io {
                table: table.to_string(),
                source,
            };
        }
        return StreamError::Malformed {
            table: table.to_string(),
            row,
            message: "unreadable record".to_string(),
        };
    }
    StreamError::Malformed {
        table: table.to_string(),
        row,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stream(data: &[u8]) -> RecordStream {
        RecordStream::new("test.txt", Box::new(Cursor::new(data.to_vec()))).unwrap()
    }

    #[test]
    fn test_rows_numbered_from_two() {
        let rows: Vec<Row> = stream(b"a,b\n1,2\n3,4\n")
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].number(), 2);
        assert_eq!(rows[1].number(), 3);
        assert_eq!(rows[1].get("b"), Some("4"));
    }

    #[test]
    fn test_byte_order_mark_stripped() {
        let s = stream("\u{feff}trip_id,route_id\nT1,R1\n".as_bytes());
        assert_eq!(s.headers(), &["trip_id".to_string(), "route_id".to_string()]);
        let row = s.into_iter().next().unwrap().unwrap();
        assert_eq!(row.get("trip_id"), Some("T1"));
    }

    #[test]
    fn test_short_row_padded_with_empty_fields() {
        let row = stream(b"a,b,c\n1\n").next().unwrap().unwrap();
        assert_eq!(row.get("a"), Some("1"));
        assert_eq!(row.get("b"), Some(""));
        assert_eq!(row.get("c"), Some(""));
        assert_eq!(row.get("d"), None);
    }

    #[test]
    fn test_stray_quote_tolerated() {
        let row = stream(b"name,id\nSt \"Mary's\" Sq,7\n")
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(row.get("id"), Some("7"));
        assert!(row.get("name").unwrap().contains("Mary's"));
    }

    #[test]
    fn test_invalid_utf8_row_is_malformed_and_stream_continues() {
        let mut s = stream(b"a\n\xff\xfe\nok\n");
        match s.next() {
            Some(Err(StreamError::Malformed { row, .. })) => assert_eq!(row, 2),
            other => panic!("expected malformed row, got {other:?}"),
        }
        let row = s.next().unwrap().unwrap();
        assert_eq!(row.number(), 3);
        assert_eq!(row.get("a"), Some("ok"));
        assert!(s.next().is_none());
    }

    #[test]
    fn test_header_whitespace_trimmed() {
        let s = stream(b" stop_id , stop_name\nS1,Main\n");
        assert!(s.header().contains("stop_id"));
        assert!(s.header().contains("stop_name"));
    }

    #[test]
    fn test_row_iter_in_header_order() {
        let row = stream(b"x,y\n1,2\n").next().unwrap().unwrap();
        let pairs: Vec<_> = row.iter().collect();
        assert_eq!(pairs, vec![("x", "1"), ("y", "2")]);
    }
}
