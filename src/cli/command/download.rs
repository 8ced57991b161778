use anyhow::Result;
use tempfile::TempDir;
use tracing::info;

use crate::{
    blob::{BlobPath, BlobStorage},
    cli::create_spinner,
    config::{BlobConfig, MarsConfig},
    ecmwf::{MarsClient, MarsRequest},
    grid::AOI_BOUNDS,
};

/// Retrieves one SEAS5 GRIB per publication year and uploads it to the raw
/// prefix of the project container.
pub async fn download(start_year: i32, end_year: i32) -> Result<usize> {
    let blob = BlobStorage::new(&BlobConfig::from_env()?)?;
    let mars = MarsClient::new(&MarsConfig::from_env()?);

    let mut uploaded = 0;
    for year in start_year..end_year {
        info!(year, "retrieving seasonal forecast");

        let tmp_dir = TempDir::new()?;
        let file_name = grib_file_name(year);
        let target = tmp_dir.path().join(&file_name);

        let bar = create_spinner(format!("Retrieving {file_name}..."));
        let request = MarsRequest::seas5_monthly(year, &AOI_BOUNDS);
        mars.retrieve(&request, &target, &bar).await?;
        bar.finish_with_message(format!("{file_name} retrieved"));

        let size = blob.upload_file(&target, &BlobPath::raw(&file_name)).await?;
        info!(year, size, "uploaded raw forecast file");
        uploaded += 1;
    }

    Ok(uploaded)
}

fn grib_file_name(year: i32) -> String {
    format!("ecmwf_mars_{year}.grib")
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn should_name_yearly_grib_files() {
        assert_eq!(grib_file_name(1981), "ecmwf_mars_1981.grib");
        assert_eq!(grib_file_name(2023), "ecmwf_mars_2023.grib");
    }
}
