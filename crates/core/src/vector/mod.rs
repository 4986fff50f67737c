//! Field boundary geometry
//!
//! A [`Boundary`] is the polygonal outline of a field, submitted as GeoJSON
//! in WGS84 longitude/latitude. The submitted document is kept verbatim so
//! it can be snapshotted next to the derived products.

use crate::crs::CRS;
use crate::error::{Error, Result};
use geo::BoundingRect;
use geo_types::{Geometry, LineString, MultiPolygon, Polygon};
use geojson::GeoJson;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;
use std::str::FromStr;

/// Polygonal field boundary in WGS84.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Boundary {
    geometry: MultiPolygon<f64>,
    document: Value,
}

impl Boundary {
    /// Parse a GeoJSON Geometry, Feature or FeatureCollection.
    ///
    /// Every polygon found is merged into one multipolygon; any other
    /// geometry type is rejected.
    pub fn from_value(document: Value) -> Result<Self> {
        let geojson = GeoJson::from_json_value(document.clone())
            .map_err(|e| Error::InvalidGeometry(e.to_string()))?;

        let mut polygons = Vec::new();
        match geojson {
            GeoJson::Geometry(g) => collect_geojson(g, &mut polygons)?,
            GeoJson::Feature(f) => {
                let g = f
                    .geometry
                    .ok_or_else(|| Error::InvalidGeometry("feature has no geometry".into()))?;
                collect_geojson(g, &mut polygons)?;
            }
            GeoJson::FeatureCollection(fc) => {
                for g in fc.features.into_iter().filter_map(|f| f.geometry) {
                    collect_geojson(g, &mut polygons)?;
                }
            }
        }

        if polygons.is_empty() {
            return Err(Error::InvalidGeometry("no polygon in GeoJSON".into()));
        }

        Ok(Self {
            geometry: MultiPolygon(polygons),
            document,
        })
    }

    /// The boundary as a multipolygon in WGS84
    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    /// CRS of the submitted coordinates
    pub fn crs(&self) -> CRS {
        CRS::wgs84()
    }

    /// The GeoJSON document as submitted
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Pretty-printed GeoJSON, used for the on-disk snapshot
    pub fn to_geojson_string(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.document).map_err(|e| Error::Encode(e.to_string()))
    }

    /// (min_x, min_y, max_x, max_y) in degrees
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        self.geometry
            .bounding_rect()
            .map(|r| (r.min().x, r.min().y, r.max().x, r.max().y))
    }

    /// WKT with `decimals` fractional digits per coordinate.
    ///
    /// A single polygon is written as `POLYGON`, several as `MULTIPOLYGON`.
    pub fn to_wkt(&self, decimals: usize) -> String {
        let mut out = String::new();
        match self.geometry.0.as_slice() {
            [single] => {
                out.push_str("POLYGON");
                write_polygon(&mut out, single, decimals);
            }
            many => {
                out.push_str("MULTIPOLYGON(");
                for (i, polygon) in many.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write_polygon(&mut out, polygon, decimals);
                }
                out.push(')');
            }
        }
        out
    }
}

impl FromStr for Boundary {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(s).map_err(|e| Error::InvalidGeometry(e.to_string()))?;
        Self::from_value(value)
    }
}

impl TryFrom<Value> for Boundary {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

impl From<Boundary> for Value {
    fn from(boundary: Boundary) -> Self {
        boundary.document
    }
}

fn collect_geojson(g: geojson::Geometry, out: &mut Vec<Polygon<f64>>) -> Result<()> {
    let geometry =
        Geometry::<f64>::try_from(g).map_err(|e| Error::InvalidGeometry(e.to_string()))?;
    collect(geometry, out)
}

fn collect(geometry: Geometry<f64>, out: &mut Vec<Polygon<f64>>) -> Result<()> {
    match geometry {
        Geometry::Polygon(p) => out.push(p),
        Geometry::MultiPolygon(mp) => out.extend(mp.0),
        Geometry::Rect(r) => out.push(r.to_polygon()),
        Geometry::GeometryCollection(gc) => {
            for g in gc.0 {
                collect(g, out)?;
            }
        }
        other => {
            return Err(Error::InvalidGeometry(format!(
                "expected polygonal geometry, got {}",
                geometry_name(&other)
            )))
        }
    }
    Ok(())
}

fn geometry_name(g: &Geometry<f64>) -> &'static str {
    match g {
        Geometry::Point(_) => "Point",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::Line(_) | Geometry::LineString(_) => "LineString",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::Triangle(_) => "Triangle",
        _ => "Polygon",
    }
}

fn write_ring(out: &mut String, ring: &LineString<f64>, decimals: usize) {
    out.push('(');
    for (i, c) in ring.0.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{:.*} {:.*}", decimals, c.x, decimals, c.y);
    }
    out.push(')');
}

fn write_polygon(out: &mut String, polygon: &Polygon<f64>, decimals: usize) {
    out.push('(');
    write_ring(out, polygon.exterior(), decimals);
    for hole in polygon.interiors() {
        out.push(',');
        write_ring(out, hole, decimals);
    }
    out.push(')');
}
