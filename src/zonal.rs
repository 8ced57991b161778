//! Zonal statistics over administrative boundaries.
//!
//! Boundaries come in as GeoJSON with the GAUL level-1 property schema
//! (`ADM0_NAME`, `ADM1_CODE`, `ADM1_NAME`, `Shape_Area`).

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use geo::{Contains, Geometry, MultiPolygon, Point};
use geojson::GeoJson;
use serde_json::Value;

use crate::grid::RegularGrid;

/// One admin-1 zone with its GAUL attributes.
#[derive(Debug, Clone)]
pub struct Zone {
    pub adm0_name: String,
    pub adm1_code: i64,
    pub adm1_name: String,
    pub shape_area: f64,
    pub geometry: MultiPolygon<f64>,
}

/// Loads zones from a GeoJSON file, keeping features of `country` whose
/// admin-1 name is in `names`.
pub fn load_zones(path: &Path, country: &str, names: &[&str]) -> Result<Vec<Zone>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read boundaries file {}", path.display()))?;
    let geojson: GeoJson = raw
        .parse()
        .with_context(|| format!("failed to parse GeoJSON {}", path.display()))?;

    let GeoJson::FeatureCollection(collection) = geojson else {
        bail!("boundaries file is not a FeatureCollection");
    };

    let mut zones = Vec::new();
    for feature in collection.features {
        let adm0_name = prop_string(&feature, "ADM0_NAME")?;
        if adm0_name != country {
            continue;
        }

        let adm1_name = prop_string(&feature, "ADM1_NAME")?;
        if !names.contains(&adm1_name.as_str()) {
            continue;
        }

        let geometry = feature
            .geometry
            .as_ref()
            .ok_or_else(|| anyhow!("feature `{adm1_name}` has no geometry"))?;
        let geometry = Geometry::<f64>::try_from(geometry)
            .with_context(|| format!("feature `{adm1_name}` has an invalid geometry"))?;
        let geometry = match geometry {
            Geometry::Polygon(polygon) => MultiPolygon(vec![polygon]),
            Geometry::MultiPolygon(multi) => multi,
            other => bail!("feature `{adm1_name}` is not a polygon: {other:?}"),
        };

        zones.push(Zone {
            adm0_name,
            adm1_code: prop_i64(&feature, "ADM1_CODE")?,
            adm1_name,
            shape_area: prop_f64(&feature, "Shape_Area")?,
            geometry,
        });
    }

    Ok(zones)
}

/// Mean of the grid cells whose center falls inside the zone geometry.
///
/// Returns None when the zone covers no cell.
pub fn zonal_mean(grid: &RegularGrid, geometry: &MultiPolygon<f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;

    for row in 0..grid.ny {
        for col in 0..grid.nx {
            let value = grid.value(row, col);
            if value.is_nan() {
                continue;
            }
            if geometry.contains(&Point::new(grid.lon(col), grid.lat(row))) {
                sum += value;
                count += 1;
            }
        }
    }

    (count > 0).then(|| sum / count as f64)
}

fn prop<'a>(feature: &'a geojson::Feature, name: &str) -> Result<&'a Value> {
    feature
        .properties
        .as_ref()
        .and_then(|props| props.get(name))
        .ok_or_else(|| anyhow!("feature is missing property `{name}`"))
}

fn prop_string(feature: &geojson::Feature, name: &str) -> Result<String> {
    prop(feature, name)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("property `{name}` is not a string"))
}

fn prop_i64(feature: &geojson::Feature, name: &str) -> Result<i64> {
    prop(feature, name)?
        .as_i64()
        .ok_or_else(|| anyhow!("property `{name}` is not an integer"))
}

fn prop_f64(feature: &geojson::Feature, name: &str) -> Result<f64> {
    prop(feature, name)?
        .as_f64()
        .ok_or_else(|| anyhow!("property `{name}` is not a number"))
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use std::io::Write;

    use geo::polygon;
    use tempfile::NamedTempFile;

    use super::*;

    fn grid_fixture() -> RegularGrid {
        // 4x4 grid, cell centers at 0.5, 1.5, 2.5, 3.5 on both axes
        RegularGrid {
            values: (0..16).map(f64::from).collect(),
            nx: 4,
            ny: 4,
            lon0: 0.5,
            lat0: 0.5,
            dlon: 1.0,
            dlat: 1.0,
        }
    }

    #[test]
    fn should_average_cells_inside_polygon() {
        let grid = grid_fixture();
        // covers the 2x2 block of centers (0.5, 0.5)..(1.5, 1.5)
        let zone = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 0.0, y: 2.0),
            (x: 0.0, y: 0.0),
        ]]);

        // values 0, 1, 4, 5
        let mean = zonal_mean(&grid, &zone).unwrap();
        assert!((mean - 2.5).abs() < 1e-9);
    }

    #[test]
    fn should_skip_nan_cells() {
        let mut grid = grid_fixture();
        grid.values[0] = f64::NAN;
        let zone = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 0.0, y: 2.0),
            (x: 0.0, y: 0.0),
        ]]);

        let mean = zonal_mean(&grid, &zone).unwrap();
        assert!((mean - 10.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn should_return_none_outside_grid() {
        let grid = grid_fixture();
        let zone = MultiPolygon(vec![polygon![
            (x: 100.0, y: 100.0),
            (x: 101.0, y: 100.0),
            (x: 101.0, y: 101.0),
            (x: 100.0, y: 100.0),
        ]]);

        assert!(zonal_mean(&grid, &zone).is_none());
    }

    #[test]
    fn should_load_and_filter_zones() {
        let geojson = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {
                        "ADM0_NAME": "Afghanistan",
                        "ADM1_CODE": 110,
                        "ADM1_NAME": "Balkh",
                        "Shape_Area": 1.41
                    },
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[66.0, 36.0], [68.0, 36.0], [68.0, 37.0], [66.0, 37.0], [66.0, 36.0]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": {
                        "ADM0_NAME": "Afghanistan",
                        "ADM1_CODE": 120,
                        "ADM1_NAME": "Kabul",
                        "Shape_Area": 0.4
                    },
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[69.0, 34.0], [69.5, 34.0], [69.5, 34.5], [69.0, 34.0]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": {
                        "ADM0_NAME": "Tajikistan",
                        "ADM1_CODE": 130,
                        "ADM1_NAME": "Balkh",
                        "Shape_Area": 0.1
                    },
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[70.0, 38.0], [71.0, 38.0], [71.0, 39.0], [70.0, 38.0]]]
                    }
                }
            ]
        }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(geojson.as_bytes()).unwrap();

        let zones = load_zones(file.path(), "Afghanistan", &["Balkh", "Faryab"]).unwrap();

        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].adm1_name, "Balkh");
        assert_eq!(zones[0].adm1_code, 110);
        assert_eq!(zones[0].geometry.0.len(), 1);
    }
}
