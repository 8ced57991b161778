use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use chrono::NaiveDate;
use tempfile::TempDir;
use tracing::info;

use crate::{
    blob::{BlobPath, BlobStorage},
    cli::create_spinner,
    config::{BlobConfig, CdsConfig},
    ecmwf::{CdsClient, Era5LandMonthlyRequest},
    grib::{self, HistoryField},
    grid::{RegularGrid, AOI_BOUNDS},
    parquet::{self, HistoryRecord},
    zonal::{self, Zone},
};

/// Provinces monitored by the pipeline.
const AOI_PROVINCES: [&str; 10] = [
    "Faryab",
    "Sar-e-Pul",
    "Jawzjan",
    "Balkh",
    "Badghis",
    "Bamyan",
    "Ghor",
    "Samangan",
    "Kunduz",
    "Takhar",
];

/// November through May.
const TARGET_MONTHS: [u32; 7] = [11, 12, 1, 2, 3, 4, 5];

const PARQUET_NAME: &str = "historical_era5_land_ndjfmam.parquet";

/// Extracts ERA5-Land monthly zonal means for the monitored provinces and
/// uploads them as a long-format parquet table.
pub async fn history(boundaries: &Path, start_year: i32, end_year: i32) -> Result<String> {
    let blob = BlobStorage::new(&BlobConfig::from_env()?)?;
    let cds = CdsClient::new(&CdsConfig::from_env()?)?;

    let zones = zonal::load_zones(boundaries, "Afghanistan", &AOI_PROVINCES)?;
    info!(zones = zones.len(), "provinces selected");

    let tmp_dir = TempDir::new()?;
    let grib_path = tmp_dir.path().join("era5_land_monthly.grib");

    let bar = create_spinner("Retrieving ERA5-Land monthly means...".to_string());
    let request = Era5LandMonthlyRequest::new(start_year..=end_year, &TARGET_MONTHS, &AOI_BOUNDS);
    cds.retrieve(
        "reanalysis-era5-land-monthly-means",
        &request,
        &grib_path,
        &bar,
    )
    .await?;
    bar.finish_with_message("ERA5-Land archive retrieved");

    let fields = grib::read_era5_land_fields(&grib_path)?;
    let fields = merge_soil_water(fields)?;
    info!(fields = fields.len(), "monthly fields decoded");

    let records = build_records(&zones, &fields);
    info!(records = records.len(), "zonal means computed");

    let parquet_path = tmp_dir.path().join(PARQUET_NAME);
    parquet::save_history(&records, &parquet_path)?;

    let blob_path = BlobPath::vector(PARQUET_NAME);
    blob.upload_file(&parquet_path, &blob_path).await?;

    Ok(blob_path)
}

/// Replaces the three soil-water layer fields of each month with their mean,
/// published as a single 1 m depth parameter. Other fields pass through.
fn merge_soil_water(fields: Vec<HistoryField>) -> Result<Vec<HistoryField>> {
    const LAYERS: [&str; 3] = [
        "volumetric_soil_water_layer_1",
        "volumetric_soil_water_layer_2",
        "volumetric_soil_water_layer_3",
    ];

    let mut merged = Vec::new();
    let mut layers: BTreeMap<NaiveDate, Vec<RegularGrid>> = BTreeMap::new();

    for field in fields {
        if LAYERS.contains(&field.parameter.as_str()) {
            layers.entry(field.date).or_default().push(field.grid);
        } else {
            merged.push(field);
        }
    }

    for (date, grids) in layers {
        merged.push(HistoryField {
            date,
            parameter: "volumetric_soil_water_1m".to_string(),
            grid: RegularGrid::mean_of(&grids)?,
        });
    }

    merged.sort_by(|a, b| (a.date, &a.parameter).cmp(&(b.date, &b.parameter)));
    Ok(merged)
}

/// One record per field and zone; zones not covered by the field grid are
/// skipped.
fn build_records(zones: &[Zone], fields: &[HistoryField]) -> Vec<HistoryRecord> {
    let mut records = Vec::new();
    for field in fields {
        for zone in zones {
            let Some(value) = zonal::zonal_mean(&field.grid, &zone.geometry) else {
                continue;
            };

            records.push(HistoryRecord {
                adm0_name: zone.adm0_name.clone(),
                adm1_code: zone.adm1_code,
                adm1_name: zone.adm1_name.clone(),
                shape_area: zone.shape_area,
                date: field.date,
                parameter: field.parameter.clone(),
                value,
            });
        }
    }

    records
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {

    use geo::polygon;
    use geo::MultiPolygon;

    use super::*;

    fn grid_fixture(fill: f64) -> RegularGrid {
        RegularGrid {
            values: vec![fill; 4],
            nx: 2,
            ny: 2,
            lon0: 66.0,
            lat0: 36.0,
            dlon: 1.0,
            dlat: 1.0,
        }
    }

    fn zone_fixture() -> Zone {
        Zone {
            adm0_name: "Afghanistan".to_string(),
            adm1_code: 110,
            adm1_name: "Balkh".to_string(),
            shape_area: 1.41,
            geometry: MultiPolygon(vec![polygon![
                (x: 65.0, y: 35.0),
                (x: 68.0, y: 35.0),
                (x: 68.0, y: 38.0),
                (x: 65.0, y: 38.0),
                (x: 65.0, y: 35.0),
            ]]),
        }
    }

    #[test]
    fn should_merge_soil_layers_into_one_parameter() {
        let date = NaiveDate::from_ymd_opt(1981, 11, 1).unwrap();
        let fields = vec![
            HistoryField {
                date,
                parameter: "snow_cover".to_string(),
                grid: grid_fixture(80.0),
            },
            HistoryField {
                date,
                parameter: "volumetric_soil_water_layer_1".to_string(),
                grid: grid_fixture(0.1),
            },
            HistoryField {
                date,
                parameter: "volumetric_soil_water_layer_2".to_string(),
                grid: grid_fixture(0.2),
            },
            HistoryField {
                date,
                parameter: "volumetric_soil_water_layer_3".to_string(),
                grid: grid_fixture(0.3),
            },
        ];

        let merged = merge_soil_water(fields).unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].parameter, "snow_cover");
        assert_eq!(merged[1].parameter, "volumetric_soil_water_1m");
        assert!((merged[1].grid.value(0, 0) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn should_build_one_record_per_field_and_zone() {
        let date = NaiveDate::from_ymd_opt(1982, 3, 1).unwrap();
        let fields = vec![HistoryField {
            date,
            parameter: "snow_cover".to_string(),
            grid: grid_fixture(55.0),
        }];
        let zones = vec![zone_fixture()];

        let records = build_records(&zones, &fields);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].adm1_name, "Balkh");
        assert_eq!(records[0].band_name(), "198203_snow_cover");
        assert!((records[0].value - 55.0).abs() < 1e-12);
    }

    #[test]
    fn should_skip_zones_outside_the_grid() {
        let date = NaiveDate::from_ymd_opt(1982, 3, 1).unwrap();
        let mut far_away = grid_fixture(1.0);
        far_away.lon0 = -100.0;
        let fields = vec![HistoryField {
            date,
            parameter: "snow_cover".to_string(),
            grid: far_away,
        }];

        let records = build_records(&[zone_fixture()], &fields);
        assert!(records.is_empty());
    }
}
