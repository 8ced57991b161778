use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use tempfile::TempDir;
use tracing::info;

use crate::{
    blob::{BlobPath, BlobStorage},
    cli::create_progress_bar,
    cog,
    config::BlobConfig,
    grib::{self, Seas5Field},
    grid::RegularGrid,
};

/// Output grid resolution in degrees, matching the MARS request grid.
const RESOLUTION: f64 = 0.4;

/// Converts every raw forecast GRIB in blob storage into one COG per
/// publication date and lead time.
pub async fn process() -> Result<usize> {
    let blob = BlobStorage::new(&BlobConfig::from_env()?)?;

    let blob_names = blob.list(&BlobPath::raw_prefix()).await?;
    let grib_names: Vec<String> = blob_names
        .into_iter()
        .filter(|name| name.ends_with(".grib"))
        .collect();
    info!(files = grib_names.len(), "found raw forecast files");

    let mut published = 0;
    for blob_name in &grib_names {
        let base_name = blob_name.rsplit('/').next().unwrap_or(blob_name);
        info!(name = base_name, "processing forecast file");

        let tmp_dir = TempDir::new()?;
        let local_path = tmp_dir.path().join(base_name);
        blob.download_file(blob_name, &local_path).await?;

        let fields = grib::read_seas5_fields(&local_path)?;
        let ensembles = group_members(fields);

        let pb = create_progress_bar(ensembles.len() as u64, format!("Tiling {base_name}"));
        for ((pub_date, forecast_month), members) in ensembles {
            let mut mean = RegularGrid::mean_of(&members)?;
            mean.scale(rate_to_monthly_depth(pub_date));

            let regridded = mean.resample(RESOLUTION);

            let file_name = cog_file_name(pub_date, forecast_month);
            let cog_path = tmp_dir.path().join(&file_name);
            cog::write_cog(&regridded, &cog_path)?;

            blob.upload_file(&cog_path, &BlobPath::cog(&file_name)).await?;
            published += 1;
            pb.inc(1);
        }
        pb.finish_with_message(format!("{base_name} tiled"));
    }

    Ok(published)
}

/// Groups ensemble members by publication date and forecast month.
fn group_members(
    fields: Vec<Seas5Field>,
) -> BTreeMap<(NaiveDate, u32), Vec<RegularGrid>> {
    let mut groups: BTreeMap<(NaiveDate, u32), Vec<RegularGrid>> = BTreeMap::new();
    for field in fields {
        groups
            .entry((field.pub_date, field.forecast_month))
            .or_default()
            .push(field.grid);
    }

    groups
}

/// Factor turning a mean precipitation rate (m/s) into a depth in mm over
/// the publication month.
fn rate_to_monthly_depth(pub_date: NaiveDate) -> f64 {
    days_in_month(pub_date) as f64 * 24.0 * 3600.0 * 1000.0
}

fn days_in_month(date: NaiveDate) -> u32 {
    let (next_year, next_month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap()
        .signed_duration_since(NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap())
        .num_days() as u32
}

/// Lead time in the file name is zero-based: forecast month 1 is the
/// publication month itself.
fn cog_file_name(pub_date: NaiveDate, forecast_month: u32) -> String {
    format!(
        "seas5_mars_tprate_em_{}_lt{}.tif",
        pub_date.format("%Y-%m-%d"),
        forecast_month - 1
    )
}

// -- Tests -------------------------------------------------------------------
