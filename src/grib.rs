//! GRIB decoding with ecCodes.
//!
//! Two readers: SEAS5 monthly-mean forecast files retrieved from MARS, and
//! ERA5-Land monthly aggregates retrieved from the CDS. Both expect fields on
//! a `regular_ll` grid.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use eccodes::{CodesHandle, FallibleStreamingIterator, KeyType, KeyedMessage, ProductKind};
use tracing::debug;

use crate::grid::{wrap_longitude, RegularGrid};

/// One SEAS5 ensemble-member field of mean total precipitation rate (m/s).
#[derive(Debug)]
pub struct Seas5Field {
    /// Forecast publication date (first of the month).
    pub pub_date: NaiveDate,
    /// Forecast month index, 1 = the publication month itself.
    pub forecast_month: u32,
    pub member: u32,
    pub grid: RegularGrid,
}

/// One ERA5-Land monthly-mean field.
#[derive(Debug)]
pub struct HistoryField {
    pub date: NaiveDate,
    /// Archive-level parameter name, e.g. `snow_cover`.
    pub parameter: String,
    pub grid: RegularGrid,
}

/// CDS variable short names mapped to archive-level parameter names.
const ERA5_LAND_PARAMS: [(&str, &str); 5] = [
    ("snowc", "snow_cover"),
    ("tp", "total_precipitation"),
    ("swvl1", "volumetric_soil_water_layer_1"),
    ("swvl2", "volumetric_soil_water_layer_2"),
    ("swvl3", "volumetric_soil_water_layer_3"),
];

/// Reads every `tprate` message of a SEAS5 monthly-mean GRIB file.
pub fn read_seas5_fields(path: &Path) -> Result<Vec<Seas5Field>> {
    let mut handle = CodesHandle::new_from_file(path, ProductKind::GRIB)
        .with_context(|| format!("failed to open GRIB file {}", path.display()))?;

    let mut fields = Vec::new();
    while let Some(msg) = handle.next()? {
        if read_string(msg, "shortName")? != "tprate" {
            continue;
        }

        let field = Seas5Field {
            pub_date: parse_data_date(read_int(msg, "dataDate")?)?,
            forecast_month: read_int(msg, "forecastMonth")? as u32,
            member: read_int(msg, "number")? as u32,
            grid: read_grid(msg)?,
        };
        debug!(
            pub_date = %field.pub_date,
            forecast_month = field.forecast_month,
            member = field.member,
            "decoded ensemble field"
        );
        fields.push(field);
    }

    if fields.is_empty() {
        bail!("no tprate messages found in {}", path.display());
    }

    Ok(fields)
}

/// Reads every message of an ERA5-Land monthly-means GRIB file.
pub fn read_era5_land_fields(path: &Path) -> Result<Vec<HistoryField>> {
    let mut handle = CodesHandle::new_from_file(path, ProductKind::GRIB)
        .with_context(|| format!("failed to open GRIB file {}", path.display()))?;

    let mut fields = Vec::new();
    while let Some(msg) = handle.next()? {
        let short_name = read_string(msg, "shortName")?;
        let Some(parameter) = era5_land_parameter(&short_name) else {
            continue;
        };

        fields.push(HistoryField {
            date: parse_data_date(read_int(msg, "dataDate")?)?,
            parameter: parameter.to_string(),
            grid: read_grid(msg)?,
        });
    }

    if fields.is_empty() {
        bail!("no known parameters found in {}", path.display());
    }

    Ok(fields)
}

fn era5_land_parameter(short_name: &str) -> Option<&'static str> {
    ERA5_LAND_PARAMS
        .iter()
        .find(|(short, _)| *short == short_name)
        .map(|(_, parameter)| *parameter)
}

/// Decodes the grid geometry and values of a message, with longitudes
/// wrapped into [-180, 180).
fn read_grid(msg: &KeyedMessage) -> Result<RegularGrid> {
    let grid_type = read_string(msg, "gridType")?;
    if grid_type != "regular_ll" {
        bail!("unsupported grid type `{grid_type}`, expected regular_ll");
    }

    let nx = read_int(msg, "Ni")? as usize;
    let ny = read_int(msg, "Nj")? as usize;

    let lat0 = read_float(msg, "latitudeOfFirstGridPointInDegrees")?;
    let lat1 = read_float(msg, "latitudeOfLastGridPointInDegrees")?;
    let lon0 = wrap_longitude(read_float(msg, "longitudeOfFirstGridPointInDegrees")?);
    let lon1 = wrap_longitude(read_float(msg, "longitudeOfLastGridPointInDegrees")?);

    let values = read_float_array(msg, "values")?;
    if values.len() != nx * ny {
        bail!(
            "message carries {} values for a {}x{} grid",
            values.len(),
            nx,
            ny
        );
    }

    let dlon = if nx > 1 { (lon1 - lon0) / (nx - 1) as f64 } else { 0.0 };
    let dlat = if ny > 1 { (lat1 - lat0) / (ny - 1) as f64 } else { 0.0 };

    Ok(RegularGrid {
        values,
        nx,
        ny,
        lon0,
        lat0,
        dlon,
        dlat,
    })
}

/// Parses a GRIB `dataDate` key (YYYYMMDD as an integer).
pub fn parse_data_date(data_date: i64) -> Result<NaiveDate> {
    let year = (data_date / 10_000) as i32;
    let month = (data_date / 100 % 100) as u32;
    let day = (data_date % 100) as u32;

    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| anyhow!("invalid dataDate {data_date}"))
}

fn read_string(msg: &KeyedMessage, name: &str) -> Result<String> {
    match msg.read_key(name)?.value {
        KeyType::Str(v) => Ok(v),
        other => bail!("key `{name}` is not a string: {other:?}"),
    }
}

fn read_int(msg: &KeyedMessage, name: &str) -> Result<i64> {
    match msg.read_key(name)?.value {
        KeyType::Int(v) => Ok(v),
        KeyType::Float(v) => Ok(v as i64),
        other => bail!("key `{name}` is not an integer: {other:?}"),
    }
}

fn read_float(msg: &KeyedMessage, name: &str) -> Result<f64> {
    match msg.read_key(name)?.value {
        KeyType::Float(v) => Ok(v),
        KeyType::Int(v) => Ok(v as f64),
        other => bail!("key `{name}` is not a float: {other:?}"),
    }
}

fn read_float_array(msg: &KeyedMessage, name: &str) -> Result<Vec<f64>> {
    match msg.read_key(name)?.value {
        KeyType::FloatArray(v) => Ok(v),
        KeyType::Float(v) => Ok(vec![v]),
        other => bail!("key `{name}` is not a float array: {other:?}"),
    }
}

// -- Tests -------------------------------------------------------------------
