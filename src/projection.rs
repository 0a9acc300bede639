//! Row projection: merged field data to the declared output column order.

use std::io;

use anyhow::Result;

use crate::models::MergedRow;
use crate::settings::{canonical_column, FLAT_COLUMNS};

fn is_flat(column: &str) -> bool {
    FLAT_COLUMNS.contains(&canonical_column(column))
}

/// Flatten `row` into one cell per output column.
///
/// Flat columns (`title`, `filename`) repeat their first value on every
/// declaration. Every other declaration consumes the next stored value of its
/// field, so `genre,genre` yields the first and the second genre. Exhausted or
/// unknown fields yield `""`.
pub fn project<S: AsRef<str>>(mut row: MergedRow, columns: &[S]) -> Vec<String> {
    columns
        .iter()
        .map(|column| {
            let column = column.as_ref();
            if is_flat(column) {
                row.first(column).unwrap_or_default().to_string()
            } else {
                row.get_mut(column)
                    .and_then(|field| field.pop_front())
                    .unwrap_or_default()
            }
        })
        .collect()
}

/// Destination for projected rows.
pub trait RowSink {
    fn write_row(&mut self, cells: &[String]) -> Result<()>;
}

impl<W: io::Write> RowSink for csv::Writer<W> {
    fn write_row(&mut self, cells: &[String]) -> Result<()> {
        self.write_record(cells)?;
        Ok(())
    }
}

impl RowSink for Vec<Vec<String>> {
    fn write_row(&mut self, cells: &[String]) -> Result<()> {
        self.push(cells.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateRecord, Record};

    fn merged() -> MergedRow {
        let record = Record::new().with("filename", "fantomas.avi");
        let candidate = CandidateRecord {
            title: "Fantomas".into(),
            genre: "Komedie".into(),
            genre2: "Krimi".into(),
            actor: "Jean Marais".into(),
            year: "1964".into(),
            ..Default::default()
        };
        MergedRow::merge(&record, &candidate).with_match("100")
    }

    #[test]
    fn test_repeated_columns_consume_values() {
        let cells = project(merged(), &["genre", "genre", "genre"]);
        assert_eq!(cells, vec!["Komedie", "Krimi", ""]);
    }

    #[test]
    fn test_flat_columns_repeat() {
        let cells = project(merged(), &["title", "title", "raw_query", "filename"]);
        assert_eq!(cells, vec!["Fantomas", "Fantomas", "fantomas.avi", "fantomas.avi"]);
    }

    #[test]
    fn test_missing_and_empty_fields() {
        let cells = project(merged(), &["country", "director", "notes", "actor", "actor2"]);
        assert_eq!(cells, vec!["", "", "", "Jean Marais", ""]);
    }

    #[test]
    fn test_default_layout() {
        let cells = project(merged(), crate::settings::DEFAULT_COLUMNS);
        assert_eq!(
            cells,
            vec![
                "fantomas.avi",
                "Fantomas",
                "1964",
                "Komedie",
                "Krimi",
                "",
                "",
                "",
                "Jean Marais",
                "",
                "100"
            ]
        );
    }

    #[test]
    fn test_csv_sink() {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_row(&["a,b".to_string(), "c".to_string()]).unwrap();
        let bytes = writer.into_inner().unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "\"a,b\",c\n");
    }
}
