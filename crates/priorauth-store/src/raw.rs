//! Raw narrative records from the source CSV.
//!
//! Columns are read by header name: `transcription` (required), `medical_specialty`,
//! `sample_name` and `description`. Every column is read as text regardless of what
//! inference would suggest. Rows with no transcription are dropped; the record index is
//! the row's position among all data rows, so ids stay stable across filtering.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, StringArray};
use arrow::csv::ReaderBuilder;
use arrow::csv::reader::Format;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use priorauth_core::RawRecord;
use tracing::info;

use crate::StoreError;

const NARRATIVE: &str = "transcription";
const SPECIALTY: &str = "medical_specialty";
const SAMPLE_NAME: &str = "sample_name";
const DESCRIPTION: &str = "description";

/// Read all records with a transcription from `path`.
pub fn read_raw_records(path: &Path) -> Result<Vec<RawRecord>, StoreError> {
    let mut file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(path.to_path_buf())
        } else {
            StoreError::io(path, e)
        }
    })?;

    let (inferred, _) = Format::default()
        .with_header(true)
        .infer_schema(&mut file, Some(1))?;
    let schema = Arc::new(Schema::new(
        inferred
            .fields()
            .iter()
            .map(|f| Field::new(f.name(), DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ));
    if schema.index_of(NARRATIVE).is_err() {
        return Err(StoreError::Other(format!(
            "{} has no `{NARRATIVE}` column",
            path.display()
        )));
    }

    file.seek(SeekFrom::Start(0))
        .map_err(|e| StoreError::io(path, e))?;
    let reader = ReaderBuilder::new(schema)
        .with_header(true)
        .build(file)?;

    let mut records = Vec::new();
    let mut row = 0usize;
    let mut dropped = 0usize;
    for batch in reader {
        let batch = batch?;
        let narrative = text_column(&batch, NARRATIVE);
        let specialty = text_column(&batch, SPECIALTY);
        let sample_name = text_column(&batch, SAMPLE_NAME);
        let description = text_column(&batch, DESCRIPTION);

        for i in 0..batch.num_rows() {
            let index = row + i;
            let Some(text) = value(narrative, i) else {
                dropped += 1;
                continue;
            };
            records.push(RawRecord {
                index,
                narrative: text.to_string(),
                specialty: value(specialty, i).unwrap_or_default().to_string(),
                sample_name: value(sample_name, i).unwrap_or_default().to_string(),
                description: value(description, i).unwrap_or_default().to_string(),
            });
        }
        row += batch.num_rows();
    }

    info!(
        path = %path.display(),
        rows = row,
        records = records.len(),
        dropped,
        "read raw records"
    );
    Ok(records)
}

fn text_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
}

fn value(column: Option<&StringArray>, i: usize) -> Option<&str> {
    column.filter(|c| c.is_valid(i)).map(|c| c.value(i))
}
