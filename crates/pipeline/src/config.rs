//! Pipeline configuration.
//!
//! Values come from [`PipelineConfig::default`], overridden by `NDVIMAP_*`
//! environment variables (a `.env` file in the working directory is loaded
//! first), overridden in turn by whatever the caller sets explicitly.

use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use ndvimap_cloud::{CatalogClientOptions, CatalogEndpoints, Credentials};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// What to do with an artifact directory left over from an earlier run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactPolicy {
    /// Remove the stale directory and rebuild it
    #[default]
    Replace,
    /// Skip the field with an artifact conflict, leaving the directory alone
    Fail,
}

impl FromStr for ArtifactPolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "fail" => Ok(Self::Fail),
            other => Err(PipelineError::Config(format!(
                "unknown artifact policy '{other}' (expected replace or fail)"
            ))),
        }
    }
}

/// Everything a pipeline run needs to know.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub catalog_url: String,
    pub download_url: String,
    pub token_url: String,
    /// Account for downloads; search works without one
    #[serde(skip)]
    pub credentials: Option<Credentials>,

    pub staging_dir: PathBuf,
    pub artifact_dir: PathBuf,
    pub fields_file: PathBuf,

    pub date_window_days: u32,
    pub max_cloud_cover: f64,
    pub max_query_length: usize,
    pub collection: String,
    pub product_type: String,
    pub red_suffix: String,
    pub nir_suffix: String,
    pub artifact_policy: ArtifactPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let endpoints = CatalogEndpoints::default();
        Self {
            catalog_url: endpoints.search_url,
            download_url: endpoints.download_url,
            token_url: endpoints.token_url,
            credentials: None,
            staging_dir: PathBuf::from("./data/temp"),
            artifact_dir: PathBuf::from("./data/map_data"),
            fields_file: PathBuf::from("./data/fields.json"),
            date_window_days: 30,
            max_cloud_cover: 20.0,
            max_query_length: CatalogClientOptions::default().max_query_length,
            collection: "SENTINEL-2".to_string(),
            product_type: "S2MSI1C".to_string(),
            red_suffix: "B04.jp2".to_string(),
            nir_suffix: "B08.jp2".to_string(),
            artifact_policy: ArtifactPolicy::Replace,
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by the process environment (and `.env`).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `lookup(NDVIMAP_*)`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut c = Self::default();

        if let Some(v) = lookup("NDVIMAP_CATALOG_URL") {
            c.catalog_url = v;
        }
        if let Some(v) = lookup("NDVIMAP_DOWNLOAD_URL") {
            c.download_url = v;
        }
        if let Some(v) = lookup("NDVIMAP_TOKEN_URL") {
            c.token_url = v;
        }
        if let (Some(user), Some(pass)) = (lookup("NDVIMAP_USERNAME"), lookup("NDVIMAP_PASSWORD")) {
            c.credentials = Some(Credentials::new(user, pass));
        }
        if let Some(v) = lookup("NDVIMAP_STAGING_DIR") {
            c.staging_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("NDVIMAP_ARTIFACT_DIR") {
            c.artifact_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("NDVIMAP_FIELDS_FILE") {
            c.fields_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("NDVIMAP_DATE_WINDOW_DAYS") {
            c.date_window_days = parse_var("NDVIMAP_DATE_WINDOW_DAYS", &v)?;
        }
        if let Some(v) = lookup("NDVIMAP_MAX_CLOUD_COVER") {
            c.max_cloud_cover = parse_var("NDVIMAP_MAX_CLOUD_COVER", &v)?;
        }
        if let Some(v) = lookup("NDVIMAP_MAX_QUERY_LENGTH") {
            c.max_query_length = parse_var("NDVIMAP_MAX_QUERY_LENGTH", &v)?;
        }
        if let Some(v) = lookup("NDVIMAP_COLLECTION") {
            c.collection = v;
        }
        if let Some(v) = lookup("NDVIMAP_PRODUCT_TYPE") {
            c.product_type = v;
        }
        if let Some(v) = lookup("NDVIMAP_RED_SUFFIX") {
            c.red_suffix = v;
        }
        if let Some(v) = lookup("NDVIMAP_NIR_SUFFIX") {
            c.nir_suffix = v;
        }
        if let Some(v) = lookup("NDVIMAP_ARTIFACT_POLICY") {
            c.artifact_policy = v.parse()?;
        }

        Ok(c)
    }

    /// Reject settings no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        if self.date_window_days == 0 {
            return Err(PipelineError::Config("date window must be at least one day".into()));
        }
        if !(0.0..=100.0).contains(&self.max_cloud_cover) {
            return Err(PipelineError::Config(format!(
                "cloud cover ceiling {} outside [0, 100]",
                self.max_cloud_cover
            )));
        }
        if self.red_suffix.is_empty() || self.nir_suffix.is_empty() {
            return Err(PipelineError::Config("band suffixes must not be empty".into()));
        }
        self.check_staging_isolated()
    }

    /// Staging is wiped on every run, so it must not overlap anything that
    /// outlives one.
    fn check_staging_isolated(&self) -> Result<()> {
        let staging = normalize(&self.staging_dir);
        let artifacts = normalize(&self.artifact_dir);
        let fields = normalize(&self.fields_file);

        if staging.starts_with(&artifacts) || artifacts.starts_with(&staging) {
            return Err(PipelineError::Config(format!(
                "staging directory {} overlaps artifact directory {}",
                self.staging_dir.display(),
                self.artifact_dir.display()
            )));
        }
        if fields.starts_with(&staging) {
            return Err(PipelineError::Config(format!(
                "field store {} lies inside staging directory {}",
                self.fields_file.display(),
                self.staging_dir.display()
            )));
        }
        Ok(())
    }

    pub fn endpoints(&self) -> CatalogEndpoints {
        CatalogEndpoints {
            search_url: self.catalog_url.clone(),
            download_url: self.download_url.clone(),
            token_url: self.token_url.clone(),
        }
    }

    pub fn client_options(&self) -> CatalogClientOptions {
        CatalogClientOptions {
            max_query_length: self.max_query_length,
            ..Default::default()
        }
    }
}

/// Absolute, lexically cleaned path: `.` dropped and `..` applied.
fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| PipelineError::Config(format!("{key}={value}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let c = PipelineConfig::default();
        c.validate().unwrap();
        assert_eq!(c.date_window_days, 30);
        assert_eq!(c.max_cloud_cover, 20.0);
        assert_eq!(c.max_query_length, 3938);
        assert_eq!(c.artifact_policy, ArtifactPolicy::Replace);
    }

    #[test]
    fn environment_overrides() {
        let c = PipelineConfig::from_lookup(lookup(&[
            ("NDVIMAP_DATE_WINDOW_DAYS", "10"),
            ("NDVIMAP_MAX_CLOUD_COVER", "35.5"),
            ("NDVIMAP_RED_SUFFIX", "B04.tif"),
            ("NDVIMAP_ARTIFACT_POLICY", "FAIL"),
            ("NDVIMAP_USERNAME", "farmer"),
            ("NDVIMAP_PASSWORD", "secret"),
        ]))
        .unwrap();
        assert_eq!(c.date_window_days, 10);
        assert_eq!(c.max_cloud_cover, 35.5);
        assert_eq!(c.red_suffix, "B04.tif");
        assert_eq!(c.artifact_policy, ArtifactPolicy::Fail);
        assert_eq!(c.credentials.map(|cr| cr.username), Some("farmer".to_string()));
    }

    #[test]
    fn username_alone_gives_no_credentials() {
        let c = PipelineConfig::from_lookup(lookup(&[("NDVIMAP_USERNAME", "farmer")])).unwrap();
        assert!(c.credentials.is_none());
    }

    #[test]
    fn malformed_number_is_a_config_error() {
        let err = PipelineConfig::from_lookup(lookup(&[("NDVIMAP_DATE_WINDOW_DAYS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut c = PipelineConfig::default();
        c.date_window_days = 0;
        assert!(c.validate().is_err());

        let mut c = PipelineConfig::default();
        c.max_cloud_cover = 120.0;
        assert!(c.validate().is_err());

        let mut c = PipelineConfig::default();
        c.nir_suffix.clear();
        assert!(c.validate().is_err());

        let mut c = PipelineConfig::default();
        c.artifact_dir = c.staging_dir.clone();
        assert!(c.validate().is_err());
    }

    #[test]
    fn staging_must_not_overlap_kept_data() {
        let with = |staging: &str, artifacts: &str, fields: &str| PipelineConfig {
            staging_dir: PathBuf::from(staging),
            artifact_dir: PathBuf::from(artifacts),
            fields_file: PathBuf::from(fields),
            ..Default::default()
        };

        // ancestor of the artifacts, spelled differently
        let err = with("./data", "data/map_data", "fields.json").validate().unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        // same directory after normalization
        assert!(with("data/./map_data", "./data/map_data", "fields.json").validate().is_err());
        // inside the artifacts
        assert!(with("data/map_data/tmp", "data/map_data", "fields.json").validate().is_err());
        // holds the field store
        assert!(with("data", "maps", "data/fields.json").validate().is_err());
        assert!(with("data/temp/../x", "maps", "data/x/fields.json").validate().is_err());

        // siblings are fine
        with("data/temp", "data/map_data", "data/fields.json").validate().unwrap();
        with("/tmp/staging", "/srv/maps", "/srv/fields.json").validate().unwrap();
    }

    #[test]
    fn normalize_is_lexical() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("data")), normalize(Path::new("./data")));
    }

    #[test]
    fn serializes_without_credentials() {
        let mut c = PipelineConfig::default();
        c.credentials = Some(Credentials::new("farmer", "secret"));
        let json = serde_json::to_string(&c).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"artifact_policy\":\"replace\""));
    }
}
