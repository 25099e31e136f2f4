// Column layout of the colocalization results table.

use arrow::datatypes::{DataType, Field, Schema};
use clap::ValueEnum;

use crate::coloc::channels::ChannelPair;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum OutputFormat {
    Infer,
    Csv,
    CsvGz,
    Parquet,
}

pub fn large_utf8_if_parquet(fmt: OutputFormat) -> DataType {
    match fmt {
        OutputFormat::Parquet => DataType::LargeUtf8,
        _ => DataType::Utf8,
    }
}

pub fn threshold_column(channel: usize) -> String {
    format!("Threshold {}", channel)
}

/// The four coefficient columns of a pair: M1 raw, M2 raw, M1 thrd, M2 thrd.
pub fn pair_columns(pair: &ChannelPair) -> [String; 4] {
    [
        format!("{} M1 raw", pair),
        format!("{} M2 raw", pair),
        format!("{} M1 thrd", pair),
        format!("{} M2 thrd", pair),
    ]
}

pub fn results_schema(fmt: OutputFormat, channels: &[usize], pairs: &[ChannelPair]) -> Schema {
    let mut fields = vec![
        Field::new("Image", large_utf8_if_parquet(fmt), false),
        Field::new("Cell", DataType::UInt32, false),
    ];
    fields.extend(
        channels
            .iter()
            .map(|&c| Field::new(threshold_column(c), DataType::Float32, true)),
    );
    fields.extend(pairs.iter().flat_map(|pair| {
        pair_columns(pair)
            .into_iter()
            .map(|name| Field::new(name, DataType::Float64, true))
    }));
    Schema::new(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_names() {
        let pairs = [ChannelPair { x: 1, y: 3 }];
        let schema = results_schema(OutputFormat::Csv, &[1, 3], &pairs);
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Image",
                "Cell",
                "Threshold 1",
                "Threshold 3",
                "1-3 M1 raw",
                "1-3 M2 raw",
                "1-3 M1 thrd",
                "1-3 M2 thrd"
            ]
        );
        assert_eq!(schema.field(0).data_type(), &DataType::Utf8);
        assert!(schema.field(2).is_nullable());
    }

    #[test]
    fn test_parquet_uses_large_strings() {
        let schema = results_schema(OutputFormat::Parquet, &[1, 2], &[]);
        assert_eq!(schema.field(0).data_type(), &DataType::LargeUtf8);
    }
}
