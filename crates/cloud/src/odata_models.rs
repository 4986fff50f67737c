//! OData product catalog data types.
//!
//! Serde models for the Copernicus Data Space `Products` endpoint, the
//! [`SceneQuery`] used to build its `$filter`, and the [`Scene`] summary the
//! rest of ndvimap works with.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Search request
// ---------------------------------------------------------------------------

/// Parameters of a product search.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneQuery {
    /// Area of interest as WKT in WGS84
    pub footprint_wkt: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Inclusive cloud cover bounds, percent
    pub min_cloud_cover: f64,
    pub max_cloud_cover: f64,
    /// Collection name, e.g. `SENTINEL-2`
    pub collection: String,
    /// Product type attribute, e.g. `S2MSI1C`
    pub product_type: Option<String>,
}

impl SceneQuery {
    /// Query over `footprint_wkt` for the `window_days` ending at `now`.
    pub fn new(footprint_wkt: impl Into<String>, now: DateTime<Utc>, window_days: u32) -> Self {
        Self {
            footprint_wkt: footprint_wkt.into(),
            start: now - Duration::days(i64::from(window_days)),
            end: now,
            min_cloud_cover: 0.0,
            max_cloud_cover: 100.0,
            collection: "SENTINEL-2".to_string(),
            product_type: None,
        }
    }

    pub fn cloud_cover(mut self, min: f64, max: f64) -> Self {
        self.min_cloud_cover = min;
        self.max_cloud_cover = max;
        self
    }

    pub fn collection(mut self, name: &str) -> Self {
        self.collection = name.to_string();
        self
    }

    pub fn product_type(mut self, product_type: &str) -> Self {
        self.product_type = Some(product_type.to_string());
        self
    }

    /// The OData `$filter` expression for this query.
    pub fn filter(&self) -> String {
        let mut clauses = vec![
            format!("Collection/Name eq '{}'", self.collection),
            format!(
                "OData.CSC.Intersects(area=geography'SRID=4326;{}')",
                self.footprint_wkt
            ),
            format!("ContentDate/Start ge {}", odata_datetime(&self.start)),
            format!("ContentDate/Start le {}", odata_datetime(&self.end)),
            format!(
                "Attributes/OData.CSC.DoubleAttribute/any(att:att/Name eq 'cloudCover' \
                 and att/OData.CSC.DoubleAttribute/Value ge {:.2} \
                 and att/OData.CSC.DoubleAttribute/Value le {:.2})",
                self.min_cloud_cover, self.max_cloud_cover
            ),
        ];
        if let Some(product_type) = &self.product_type {
            clauses.push(format!(
                "Attributes/OData.CSC.StringAttribute/any(att:att/Name eq 'productType' \
                 and att/OData.CSC.StringAttribute/Value eq '{}')",
                product_type
            ));
        }
        clauses.join(" and ")
    }
}

fn odata_datetime(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// One page of `Products` results.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProductPage {
    #[serde(default)]
    pub value: Vec<Product>,

    #[serde(rename = "@odata.nextLink", skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,
}

impl ProductPage {
    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// A catalog product.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Product {
    /// Opaque product key
    pub id: String,
    /// Product name, e.g. `S2B_MSIL1C_20240611T095559_..._20240611T115210.SAFE`
    pub name: String,
    #[serde(default)]
    pub content_date: Option<ContentDate>,
    #[serde(default)]
    pub online: Option<bool>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContentDate {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A typed product attribute (`$expand=Attributes`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Attribute {
    pub name: String,
    pub value: serde_json::Value,
}

impl Product {
    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.value)
    }

    pub fn cloud_cover(&self) -> Option<f64> {
        self.attribute("cloudCover").and_then(|v| v.as_f64())
    }

    pub fn acquired(&self) -> Option<DateTime<Utc>> {
        self.content_date.as_ref().map(|d| d.start)
    }
}

// ---------------------------------------------------------------------------
// Scene summary
// ---------------------------------------------------------------------------

/// What the pipeline needs to know about a candidate scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Catalog key used for download
    pub scene_id: String,
    /// Scene directory name once extracted (`*.SAFE`)
    pub filename: String,
    pub cloud_cover: f64,
    pub acquisition_date: DateTime<Utc>,
}

impl Scene {
    /// File name of the downloaded archive: the scene name without its
    /// `.SAFE` suffix, plus `.zip`.
    pub fn archive_name(&self) -> String {
        let stem = self
            .filename
            .strip_suffix(".SAFE")
            .unwrap_or(&self.filename);
        format!("{}.zip", stem)
    }
}

impl TryFrom<Product> for Scene {
    type Error = String;

    fn try_from(p: Product) -> Result<Self, Self::Error> {
        let cloud_cover = p
            .cloud_cover()
            .ok_or_else(|| format!("{} has no cloudCover attribute", p.name))?;
        let acquisition_date = p
            .acquired()
            .ok_or_else(|| format!("{} has no ContentDate", p.name))?;
        Ok(Scene {
            scene_id: p.id,
            filename: p.name,
            cloud_cover,
            acquisition_date,
        })
    }
}

/// Sort ascending by cloud cover, newest first among equals.
pub fn sort_by_cloud_cover(scenes: &mut [Scene]) {
    scenes.sort_by(|a, b| {
        a.cloud_cover
            .total_cmp(&b.cloud_cover)
            .then_with(|| b.acquisition_date.cmp(&a.acquisition_date))
    });
}
