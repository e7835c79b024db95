//! Parquet export

use super::record_batch::table_to_record_batch;
use super::frame::Table;
use crate::error::{Result, ResultExt};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Write a table to a Snappy-compressed Parquet file.
///
/// Returns the number of rows written.
pub fn write_parquet(table: &Table, path: &Path) -> Result<usize> {
    let batch = table_to_record_batch(table)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory '{}'", parent.display()))?;
    }

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let file = File::create(path)
        .with_context(|| format!("Failed to create '{}'", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    debug!(path = %path.display(), rows = batch.num_rows(), "Wrote parquet file");
    Ok(batch.num_rows())
}
