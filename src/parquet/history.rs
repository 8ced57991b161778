//! Save zonal history records to a parquet file.

use std::{fs::File, path::PathBuf, sync::Arc};

use anyhow::Result;
use arrow::{
    array::{Date32Builder, Float64Builder, Int64Builder, StringBuilder},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use chrono::{Datelike, NaiveDate};
use parquet::{arrow::ArrowWriter, file::properties::WriterProperties};

/// One zonal mean in long format.
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub adm0_name: String,
    pub adm1_code: i64,
    pub adm1_name: String,
    pub shape_area: f64,
    pub date: NaiveDate,
    pub parameter: String,
    pub value: f64,
}

impl HistoryRecord {
    /// Band label in the `{YYYYMM}_{parameter}` form of the source archive.
    pub fn band_name(&self) -> String {
        format!("{}_{}", self.date.format("%Y%m"), self.parameter)
    }
}

pub fn save_history(records: &[HistoryRecord], file_path: &PathBuf) -> Result<()> {
    let file = File::create(file_path)?;

    let schema = Arc::new(Schema::new(vec![
        Field::new("adm0_name", DataType::Utf8, false),
        Field::new("adm1_code", DataType::Int64, false),
        Field::new("adm1_name", DataType::Utf8, false),
        Field::new("shape_area", DataType::Float64, false),
        Field::new("band_name", DataType::Utf8, false),
        Field::new("date", DataType::Date32, false),
        Field::new("parameter", DataType::Utf8, false),
        Field::new("value", DataType::Float64, false),
    ]));

    let props = WriterProperties::builder()
        .set_compression(parquet::basic::Compression::ZSTD(
            parquet::basic::ZstdLevel::default(),
        ))
        .set_dictionary_enabled(true)
        .build();

    let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;

    let mut adm0_builder = StringBuilder::new();
    let mut code_builder = Int64Builder::new();
    let mut adm1_builder = StringBuilder::new();
    let mut area_builder = Float64Builder::new();
    let mut band_builder = StringBuilder::new();
    let mut date_builder = Date32Builder::new();
    let mut parameter_builder = StringBuilder::new();
    let mut value_builder = Float64Builder::new();

    let epoch_offset = NaiveDate::from_ymd_opt(1970, 1, 1)
        .unwrap()
        .num_days_from_ce();

    for record in records {
        adm0_builder.append_value(&record.adm0_name);
        code_builder.append_value(record.adm1_code);
        adm1_builder.append_value(&record.adm1_name);
        area_builder.append_value(record.shape_area);
        band_builder.append_value(record.band_name());
        date_builder.append_value(record.date.num_days_from_ce() - epoch_offset);
        parameter_builder.append_value(&record.parameter);
        value_builder.append_value(record.value);
    }

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(adm0_builder.finish()),
            Arc::new(code_builder.finish()),
            Arc::new(adm1_builder.finish()),
            Arc::new(area_builder.finish()),
            Arc::new(band_builder.finish()),
            Arc::new(date_builder.finish()),
            Arc::new(parameter_builder.finish()),
            Arc::new(value_builder.finish()),
        ],
    )?;

    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}

// -- Tests -------------------------------------------------------------------
