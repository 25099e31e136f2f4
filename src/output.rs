use arrow::array::{
    ArrayRef, Float32Array, Float64Array, LargeStringArray, RecordBatch, StringArray, UInt32Array,
};
use arrow::csv;
use arrow::error::ArrowError;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression::ZSTD, ZstdLevel};
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::coloc::channels::{ChannelPair, ChannelSelection};
use crate::coloc::manders::MandersResult;
use crate::coloc::CellAnalysis;
use crate::schemas::{results_schema, OutputFormat};

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("unknown output format for {0}")]
    UnknownFormat(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Arrow(#[from] ArrowError),
    #[error(transparent)]
    Parquet(#[from] ParquetError),
}

/// One row per analyzed cell.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultRow {
    pub image: String,
    pub cell: usize,
    pub thresholds: Vec<Option<f32>>,
    pub pairs: Vec<MandersResult>,
}

/// Append-only results of a batch, laid out for a fixed channel selection.
#[derive(Debug)]
pub struct ResultsTable {
    channels: Vec<usize>,
    pairs: Vec<ChannelPair>,
    rows: Vec<ResultRow>,
}

impl ResultsTable {
    pub fn new(selection: &ChannelSelection) -> Self {
        ResultsTable {
            channels: selection.channels().collect(),
            pairs: selection.pairs(),
            rows: Vec::new(),
        }
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push(&mut self, image: &str, analysis: &CellAnalysis) {
        let thresholds = self.channels.iter().map(|&c| analysis.cutoff(c)).collect();
        let pairs = self
            .pairs
            .iter()
            .map(|pair| {
                analysis
                    .pairs
                    .iter()
                    .find(|(p, _)| p == pair)
                    .map(|(_, result)| *result)
                    .unwrap_or_else(|| panic!("cell {} is missing pair {}", analysis.cell, pair))
            })
            .collect();

        self.rows.push(ResultRow {
            image: image.to_string(),
            cell: analysis.cell,
            thresholds,
            pairs,
        });
    }

    pub fn to_record_batch(&self, fmt: OutputFormat) -> Result<RecordBatch, ArrowError> {
        let schema = results_schema(fmt, &self.channels, &self.pairs);

        let images = self.rows.iter().map(|row| Some(row.image.as_str()));
        let image_column: ArrayRef = match fmt {
            OutputFormat::Parquet => Arc::new(images.collect::<LargeStringArray>()),
            _ => Arc::new(images.collect::<StringArray>()),
        };
        let mut columns: Vec<ArrayRef> = vec![
            image_column,
            Arc::new(
                self.rows
                    .iter()
                    .map(|row| row.cell as u32)
                    .collect::<UInt32Array>(),
            ),
        ];

        for i in 0..self.channels.len() {
            columns.push(Arc::new(
                self.rows
                    .iter()
                    .map(|row| row.thresholds[i])
                    .collect::<Float32Array>(),
            ));
        }

        for i in 0..self.pairs.len() {
            let coefficient = |f: fn(&MandersResult) -> Option<f64>| -> ArrayRef {
                Arc::new(
                    self.rows
                        .iter()
                        .map(|row| f(&row.pairs[i]))
                        .collect::<Float64Array>(),
                )
            };
            columns.push(coefficient(|r| r.raw.m1));
            columns.push(coefficient(|r| r.raw.m2));
            columns.push(coefficient(|r| r.thresholded.m1));
            columns.push(coefficient(|r| r.thresholded.m2));
        }

        RecordBatch::try_new(Arc::new(schema), columns)
    }
}

pub fn determine_format(filename: &str, fmt: OutputFormat) -> Result<OutputFormat, OutputError> {
    if fmt != OutputFormat::Infer {
        return Ok(fmt);
    }

    if filename.ends_with(".csv.gz") {
        Ok(OutputFormat::CsvGz)
    } else if filename.ends_with(".csv") {
        Ok(OutputFormat::Csv)
    } else if filename.ends_with(".parquet") {
        Ok(OutputFormat::Parquet)
    } else {
        Err(OutputError::UnknownFormat(filename.to_string()))
    }
}

pub fn write_results(
    path: &Path,
    fmt: OutputFormat,
    table: &ResultsTable,
) -> Result<(), OutputError> {
    let fmt = determine_format(&path.to_string_lossy(), fmt)?;
    let batch = table.to_record_batch(fmt)?;
    write_table(path, fmt, &batch)?;
    info!("wrote {} rows to {}", table.len(), path.display());
    Ok(())
}

pub fn write_table(path: &Path, fmt: OutputFormat, batch: &RecordBatch) -> Result<(), OutputError> {
    let file = File::create(path)?;

    match fmt {
        OutputFormat::Csv | OutputFormat::Infer => {
            let mut writer = csv::WriterBuilder::new().with_header(true).build(file);
            writer.write(batch)?;
        }
        OutputFormat::CsvGz => {
            let mut encoder = GzEncoder::new(file, Compression::default());
            {
                let mut writer = csv::WriterBuilder::new()
                    .with_header(true)
                    .build(&mut encoder);
                writer.write(batch)?;
            }
            encoder.finish()?;
        }
        OutputFormat::Parquet => {
            let props = WriterProperties::builder()
                .set_compression(ZSTD(ZstdLevel::try_new(3)?))
                .build();
            let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
            writer.write(batch)?;
            writer.close()?;
        }
    }

    Ok(())
}
