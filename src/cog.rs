//! Cloud-Optimized GeoTIFF output.
//!
//! The COG driver only supports copying an existing dataset, so grids are
//! staged in an in-memory dataset first and copied out with creation options.

use std::path::Path;

use anyhow::{Context, Result};
use gdal::raster::{Buffer, RasterCreationOptions};
use gdal::spatial_ref::SpatialRef;
use gdal::DriverManager;

use crate::grid::RegularGrid;

/// Writes a single-band EPSG:4326 COG for the grid.
pub fn write_cog(grid: &RegularGrid, path: &Path) -> Result<()> {
    let mem = DriverManager::get_driver_by_name("MEM")?;
    let mut dataset = mem
        .create_with_band_type::<f64, _>("", grid.nx, grid.ny, 1)
        .context("failed to create staging dataset")?;

    dataset.set_geo_transform(&grid.geo_transform())?;
    dataset.set_spatial_ref(&SpatialRef::from_epsg(4326)?)?;

    let mut band = dataset.rasterband(1)?;
    band.set_no_data_value(Some(f64::NAN))?;

    let mut buffer = Buffer::new((grid.nx, grid.ny), grid.values.clone());
    band.write((0, 0), (grid.nx, grid.ny), &mut buffer)?;

    let cog = DriverManager::get_driver_by_name("COG")?;
    let options = RasterCreationOptions::from_iter(["COMPRESS=DEFLATE"]);

    dataset
        .create_copy(&cog, path, &options)
        .with_context(|| format!("failed to write COG {}", path.display()))?;

    Ok(())
}

// -- Tests -------------------------------------------------------------------
