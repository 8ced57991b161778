//! Regular latitude/longitude grids and bilinear resampling.

use anyhow::{anyhow, Result};

/// Geographic bounding box in degrees, EPSG:4326.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

/// Bounding box around Afghanistan, shared by all commands.
pub const AOI_BOUNDS: BoundingBox = BoundingBox {
    xmin: 60.0,
    ymin: 29.0,
    xmax: 76.0,
    ymax: 39.0,
};

impl BoundingBox {
    /// MARS `area` string: north/west/south/east.
    pub fn mars_area(&self) -> String {
        format!("{}/{}/{}/{}", self.ymax, self.xmin, self.ymin, self.xmax)
    }

    /// CDS `area` array: [north, west, south, east].
    pub fn cds_area(&self) -> [f64; 4] {
        [self.ymax, self.xmin, self.ymin, self.xmax]
    }
}

/// Wraps a longitude into [-180, 180).
pub fn wrap_longitude(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// A field on a regular lat/lon grid.
///
/// Values are row-major with `nx` columns; `lon0`/`lat0` are the coordinates
/// of the first grid point and `dlat` is signed, so grids scanned
/// north-to-south (the usual GRIB layout) carry a negative latitude step.
#[derive(Debug, Clone)]
pub struct RegularGrid {
    pub values: Vec<f64>,
    pub nx: usize,
    pub ny: usize,
    pub lon0: f64,
    pub lat0: f64,
    pub dlon: f64,
    pub dlat: f64,
}

impl RegularGrid {
    pub fn lon(&self, col: usize) -> f64 {
        self.lon0 + col as f64 * self.dlon
    }

    pub fn lat(&self, row: usize) -> f64 {
        self.lat0 + row as f64 * self.dlat
    }

    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.nx + col]
    }

    /// (min, max) longitude of the grid points.
    pub fn lon_bounds(&self) -> (f64, f64) {
        let last = self.lon(self.nx - 1);
        (self.lon0.min(last), self.lon0.max(last))
    }

    /// (min, max) latitude of the grid points.
    pub fn lat_bounds(&self) -> (f64, f64) {
        let last = self.lat(self.ny - 1);
        (self.lat0.min(last), self.lat0.max(last))
    }

    /// Multiplies every value in place.
    pub fn scale(&mut self, factor: f64) {
        for v in &mut self.values {
            *v *= factor;
        }
    }

    /// Element-wise mean of several grids with identical geometry.
    pub fn mean_of(grids: &[RegularGrid]) -> Result<RegularGrid> {
        let first = grids
            .first()
            .ok_or_else(|| anyhow!("cannot average zero grids"))?;

        let mut sum = vec![0.0; first.values.len()];
        for grid in grids {
            if grid.nx != first.nx || grid.ny != first.ny {
                return Err(anyhow!(
                    "grid shape mismatch: {}x{} vs {}x{}",
                    grid.nx,
                    grid.ny,
                    first.nx,
                    first.ny
                ));
            }
            for (acc, v) in sum.iter_mut().zip(&grid.values) {
                *acc += v;
            }
        }

        let n = grids.len() as f64;
        Ok(RegularGrid {
            values: sum.into_iter().map(|v| v / n).collect(),
            ..first.clone()
        })
    }

    /// Bilinear sample at a geographic coordinate.
    ///
    /// Returns NaN outside the grid extent or when any of the four
    /// surrounding points is NaN.
    pub fn sample(&self, lon: f64, lat: f64) -> f64 {
        let fx = (lon - self.lon0) / self.dlon;
        let fy = (lat - self.lat0) / self.dlat;

        if fx < 0.0 || fy < 0.0 || fx > (self.nx - 1) as f64 || fy > (self.ny - 1) as f64 {
            return f64::NAN;
        }

        let x0 = fx.floor() as usize;
        let y0 = fy.floor() as usize;
        let x1 = (x0 + 1).min(self.nx - 1);
        let y1 = (y0 + 1).min(self.ny - 1);

        let xf = fx - x0 as f64;
        let yf = fy - y0 as f64;

        let v00 = self.value(y0, x0);
        let v10 = self.value(y0, x1);
        let v01 = self.value(y1, x0);
        let v11 = self.value(y1, x1);

        if v00.is_nan() || v10.is_nan() || v01.is_nan() || v11.is_nan() {
            return f64::NAN;
        }

        let top = v00 * (1.0 - xf) + v10 * xf;
        let bottom = v01 * (1.0 - xf) + v11 * xf;
        top * (1.0 - yf) + bottom * yf
    }

    /// Resamples onto a regular grid of the given resolution covering the
    /// source extent, rows running south to north.
    pub fn resample(&self, resolution: f64) -> RegularGrid {
        let (lon_min, lon_max) = self.lon_bounds();
        let (lat_min, lat_max) = self.lat_bounds();

        let nx = ((lon_max - lon_min) / resolution).round() as usize + 1;
        let ny = ((lat_max - lat_min) / resolution).round() as usize + 1;

        let mut values = Vec::with_capacity(nx * ny);
        for row in 0..ny {
            let lat = lat_min + row as f64 * resolution;
            for col in 0..nx {
                let lon = lon_min + col as f64 * resolution;
                values.push(self.sample(lon, lat));
            }
        }

        RegularGrid {
            values,
            nx,
            ny,
            lon0: lon_min,
            lat0: lat_min,
            dlon: resolution,
            dlat: resolution,
        }
    }

    /// GDAL-style geotransform with pixel edges half a cell out from the
    /// first grid point.
    pub fn geo_transform(&self) -> [f64; 6] {
        [
            self.lon0 - self.dlon / 2.0,
            self.dlon,
            0.0,
            self.lat0 - self.dlat / 2.0,
            0.0,
            self.dlat,
        ]
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn grid_fixture() -> RegularGrid {
        // 3x3, lats 39 -> 38.2 (north to south), lons 60 -> 60.8
        RegularGrid {
            values: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0],
            nx: 3,
            ny: 3,
            lon0: 60.0,
            lat0: 39.0,
            dlon: 0.4,
            dlat: -0.4,
        }
    }

    #[test]
    fn should_wrap_longitudes() {
        assert_eq!(wrap_longitude(60.0), 60.0);
        assert_eq!(wrap_longitude(180.0), -180.0);
        assert_eq!(wrap_longitude(350.0), -10.0);
        assert_eq!(wrap_longitude(-190.0), 170.0);
        assert_eq!(wrap_longitude(360.0), 0.0);
    }

    #[test]
    fn should_format_mars_area() {
        assert_eq!(AOI_BOUNDS.mars_area(), "39/60/29/76");
    }

    #[test]
    fn should_reproduce_grid_points() {
        let grid = grid_fixture();

        assert_eq!(grid.sample(60.0, 39.0), 1.0);
        assert_eq!(grid.sample(60.8, 39.0), 3.0);
        assert_eq!(grid.sample(60.0, 38.2), 7.0);
        assert_eq!(grid.sample(60.8, 38.2), 9.0);
    }

    #[test]
    fn should_interpolate_between_points() {
        let grid = grid_fixture();

        // centre of the top-left cell
        let v = grid.sample(60.2, 38.8);
        assert!((v - 3.0).abs() < 1e-9);
    }

    #[test]
    fn should_return_nan_outside_extent() {
        let grid = grid_fixture();

        assert!(grid.sample(59.0, 38.0).is_nan());
        assert!(grid.sample(60.4, 40.0).is_nan());
    }

    #[test]
    fn should_propagate_nan_corners() {
        let mut grid = grid_fixture();
        grid.values[4] = f64::NAN;

        assert!(grid.sample(60.2, 38.8).is_nan());
    }

    #[test]
    fn should_average_members() {
        let a = grid_fixture();
        let mut b = grid_fixture();
        b.scale(3.0);

        let mean = RegularGrid::mean_of(&[a, b]).unwrap();
        assert_eq!(mean.value(0, 0), 2.0);
        assert_eq!(mean.value(2, 2), 18.0);
    }

    #[test]
    fn should_reject_mismatched_members() {
        let a = grid_fixture();
        let mut b = grid_fixture();
        b.nx = 2;
        b.ny = 2;
        b.values.truncate(4);

        assert!(RegularGrid::mean_of(&[a, b]).is_err());
    }

    #[test]
    fn should_resample_south_up_at_native_resolution() {
        let grid = grid_fixture();
        let out = grid.resample(0.4);

        assert_eq!(out.nx, 3);
        assert_eq!(out.ny, 3);
        assert_eq!(out.lat0, 38.2);
        assert!(out.dlat > 0.0);
        // first output row is the southernmost source row
        assert_eq!(out.value(0, 0), 7.0);
        assert_eq!(out.value(2, 2), 3.0);
    }

    #[test]
    fn should_build_geo_transform_from_cell_edges() {
        let grid = grid_fixture().resample(0.4);
        let gt = grid.geo_transform();

        assert!((gt[0] - 59.8).abs() < 1e-9);
        assert_eq!(gt[1], 0.4);
        assert!((gt[3] - 38.0).abs() < 1e-9);
        assert_eq!(gt[5], 0.4);
    }
}
