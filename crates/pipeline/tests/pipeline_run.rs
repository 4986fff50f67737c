//! End-to-end runs against an offline catalog.
//!
//! The fake catalog serves zip archives built in memory with the usual
//! scene layout and native GeoTIFF bands (`*_B04.tif`, `*_B08.tif`).

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use chrono::{DateTime, TimeZone, Utc};
use ndvimap_cloud::{CloudError, Scene, SceneQuery};
use ndvimap_core::crs::wgs84_to_utm;
use ndvimap_core::io::{read_geotiff, write_geotiff_to_buffer};
use ndvimap_core::{Boundary, GeoTransform, Raster, CRS};
use ndvimap_pipeline::{
    ArtifactLayout, ArtifactPolicy, FieldStore, JobGate, MemoryFieldStore, Pipeline,
    PipelineConfig, PipelineError, SceneCatalog, Submission,
};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

const SIZE: usize = 100;
const PIXEL: f64 = 10.0;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Square field of half-width `d` degrees centered on (lon, lat).
fn square(lon: f64, lat: f64, d: f64) -> Boundary {
    format!(
        r#"{{"type":"Polygon","coordinates":[[[{w},{s}],[{e},{s}],[{e},{n}],[{w},{n}],[{w},{s}]]]}}"#,
        w = lon - d,
        e = lon + d,
        s = lat - d,
        n = lat + d
    )
    .parse()
    .unwrap()
}

fn scene(id: &str, cloud_cover: f64) -> Scene {
    Scene {
        scene_id: id.to_string(),
        filename: format!("S2A_MSIL1C_20240620T100031_N0510_R122_{id}_20240620T120000.SAFE"),
        cloud_cover,
        acquisition_date: Utc.with_ymd_and_hms(2024, 6, 20, 10, 0, 31).unwrap(),
    }
}

/// Band raster in UTM 33N, 1 km square centered on (15E, 45N).
///
/// The top row is zero so the index there must come out exactly 0.
fn band(value: f32) -> Raster<f32> {
    let (x0, y0) = wgs84_to_utm(15.0, 45.0, 33, true);
    let half = SIZE as f64 * PIXEL / 2.0;
    let mut r = Raster::filled(SIZE, SIZE, value);
    for col in 0..SIZE {
        r.set(0, col, 0.0).unwrap();
    }
    r.set_transform(GeoTransform::new(x0 - half, y0 + half, PIXEL, -PIXEL));
    r.set_crs(Some(CRS::from_epsg(32633)));
    r
}

/// Ring of `n` vertices around (lon, lat); enough of them overflow the
/// catalog's query length limit.
fn jagged(lon: f64, lat: f64, n: usize) -> Boundary {
    let ring: Vec<String> = (0..=n)
        .map(|i| {
            let a = std::f64::consts::TAU * (i % n) as f64 / n as f64;
            let r = if i % 2 == 0 { 0.001 } else { 0.0007 };
            format!("[{},{}]", lon + r * a.cos(), lat + r * a.sin())
        })
        .collect();
    format!(r#"{{"type":"Polygon","coordinates":[[{}]]}}"#, ring.join(","))
        .parse()
        .unwrap()
}

/// Scene archive with one granule holding the red and NIR bands.
fn archive(scene: &Scene, granules: &[&str]) -> Vec<u8> {
    let red = write_geotiff_to_buffer(&band(10.0), None).unwrap();
    let nir = write_geotiff_to_buffer(&band(30.0), None).unwrap();

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    zip.start_file(format!("{}/manifest.safe", scene.filename), options).unwrap();
    zip.write_all(b"<xfdu/>").unwrap();
    for granule in granules {
        let img = format!("{}/GRANULE/{}/IMG_DATA", scene.filename, granule);
        zip.start_file(format!("{img}/T33TWM_20240620T100031_B04.tif"), options).unwrap();
        zip.write_all(&red).unwrap();
        zip.start_file(format!("{img}/T33TWM_20240620T100031_B08.tif"), options).unwrap();
        zip.write_all(&nir).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

// ---------------------------------------------------------------------------
// Fake catalog
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CatalogLog {
    searches: usize,
    downloads: Vec<Vec<String>>,
}

/// Answers searches by footprint and serves prepared archives.
#[derive(Default)]
struct FakeCatalog {
    /// (footprint WKT, scenes returned)
    listings: Vec<(String, Vec<Scene>)>,
    archives: HashMap<String, Vec<u8>>,
    fail_downloads: bool,
    /// Every search answers with a server error
    fail_search: bool,
    /// Search blocks until a message arrives
    hold: Option<Mutex<Receiver<()>>>,
    log: Arc<Mutex<CatalogLog>>,
}

impl FakeCatalog {
    fn list(mut self, boundary: &Boundary, scenes: Vec<Scene>) -> Self {
        let key = boundary.to_wkt(4);
        for s in &scenes {
            self.archives
                .entry(s.scene_id.clone())
                .or_insert_with(|| archive(s, &["L1C_T33TWM_A046825_20240620T100031"]));
        }
        self.listings.push((key, scenes));
        self
    }

    fn with_archive(mut self, scene: &Scene, data: Vec<u8>) -> Self {
        self.archives.insert(scene.scene_id.clone(), data);
        self
    }
}

impl SceneCatalog for FakeCatalog {
    fn query_length(&self, query: &SceneQuery) -> Result<usize, CloudError> {
        Ok(query.filter().len())
    }

    fn max_query_length(&self) -> usize {
        3938
    }

    fn search(&self, query: &SceneQuery) -> Result<Vec<Scene>, CloudError> {
        if let Some(hold) = &self.hold {
            let _ = hold.lock().unwrap().recv();
        }
        self.log.lock().unwrap().searches += 1;
        if self.fail_search {
            return Err(CloudError::Network("HTTP 503 from catalogue".into()));
        }
        Ok(self
            .listings
            .iter()
            .find(|(key, _)| query.footprint_wkt == *key)
            .map(|(_, scenes)| scenes.clone())
            .unwrap_or_default())
    }

    fn download(&self, scenes: &[Scene], dest: &Path) -> Result<Vec<PathBuf>, CloudError> {
        self.log
            .lock()
            .unwrap()
            .downloads
            .push(scenes.iter().map(|s| s.scene_id.clone()).collect());
        if self.fail_downloads {
            return Err(CloudError::Download {
                product: scenes[0].filename.clone(),
                reason: "HTTP 503".into(),
            });
        }
        scenes
            .iter()
            .map(|s| -> Result<PathBuf, CloudError> {
                let path = dest.join(s.archive_name());
                fs::write(&path, &self.archives[&s.scene_id])?;
                Ok(path)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Setup {
    _tmp: TempDir,
    config: PipelineConfig,
    store: Arc<MemoryFieldStore>,
    layout: ArtifactLayout,
}

impl Setup {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let config = PipelineConfig {
            staging_dir: tmp.path().join("temp"),
            artifact_dir: tmp.path().join("map_data"),
            fields_file: tmp.path().join("fields.json"),
            red_suffix: "B04.tif".into(),
            nir_suffix: "B08.tif".into(),
            ..Default::default()
        };
        let layout = ArtifactLayout::new(&config.artifact_dir);
        Self {
            _tmp: tmp,
            config,
            store: Arc::new(MemoryFieldStore::new()),
            layout,
        }
    }

    fn add(&self, name: &str, boundary: &Boundary) -> i64 {
        self.store.add_field(name, boundary.clone()).unwrap()
    }

    fn pipeline(&self, catalog: FakeCatalog) -> Pipeline {
        Pipeline::new(self.config.clone(), Box::new(catalog), self.store.clone())
            .unwrap()
            .with_clock(now)
    }

    fn pending(&self) -> Vec<i64> {
        self.store
            .list_pending_fields()
            .unwrap()
            .into_iter()
            .map(|f| f.id)
            .collect()
    }

    fn staging_is_empty(&self) -> bool {
        fs::read_dir(&self.config.staging_dir)
            .map(|mut d| d.next().is_none())
            .unwrap_or(true)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn shared_scene_downloaded_once_and_fields_completed() {
    let setup = Setup::new();
    let west = square(14.999, 45.0, 0.0008);
    let east = square(15.001, 45.0, 0.0008);
    let a = setup.add("west", &west);
    let b = setup.add("east", &east);

    let shared = scene("T33TWM", 4.0);
    let catalog = FakeCatalog::default()
        .list(&west, vec![scene("T33TXM", 12.0), shared.clone()])
        .list(&east, vec![shared]);
    let log = catalog.log.clone();

    let report = setup.pipeline(catalog).run().unwrap();

    assert_eq!(report.pending, 2);
    assert_eq!(report.completed, vec![a, b]);
    assert!(report.is_clean(), "{:?}", report.skipped);
    assert_eq!(report.scenes_downloaded, 1);
    assert_eq!(log.lock().unwrap().downloads, vec![vec!["T33TWM".to_string()]]);
    assert!(setup.pending().is_empty());

    for id in [a, b] {
        assert!(setup.layout.missing(id).is_empty());
        assert!(setup.layout.preview_path(id).is_some());
    }
    assert!(setup.staging_is_empty());
}

#[test]
fn index_values_follow_the_bands() {
    let setup = Setup::new();
    let field = square(15.0, 45.0, 0.001);
    let id = setup.add("center", &field);
    let catalog = FakeCatalog::default().list(&field, vec![scene("T33TWM", 1.0)]);

    setup.pipeline(catalog).run().unwrap();

    let index: Raster<f32> = read_geotiff(setup.layout.index_path(id), None).unwrap();
    assert_eq!(index.shape(), (SIZE, SIZE));
    assert_eq!(index.crs().and_then(|c| c.epsg()), Some(32633));
    // red 10, nir 30
    assert_relative_eq!(index.get(50, 50).unwrap(), 0.5, epsilon = 1e-6);
    // red 0, nir 0
    assert_eq!(index.get(0, 10).unwrap(), 0.0);

    let masked: Raster<f32> = read_geotiff(setup.layout.masked_path(id), None).unwrap();
    assert!(masked.rows() < SIZE && masked.cols() < SIZE);
    assert!(masked.data().iter().any(|v| (*v - 0.5).abs() < 1e-6));

    let snapshot: Boundary = fs::read_to_string(setup.layout.boundary_path(id))
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(snapshot, field);
}

#[test]
fn rerun_with_nothing_pending_is_a_no_op() {
    let setup = Setup::new();
    let field = square(15.0, 45.0, 0.001);
    setup.add("center", &field);

    let first = FakeCatalog::default().list(&field, vec![scene("T33TWM", 1.0)]);
    setup.pipeline(first).run().unwrap();

    let second = FakeCatalog::default().list(&field, vec![scene("T33TWM", 1.0)]);
    let log = second.log.clone();
    let report = setup.pipeline(second).run().unwrap();

    assert_eq!(report.pending, 0);
    assert!(report.completed.is_empty());
    let log = log.lock().unwrap();
    assert_eq!(log.searches, 0);
    assert!(log.downloads.is_empty());
}

#[test]
fn field_without_scene_stays_pending() {
    let setup = Setup::new();
    let covered = square(15.0, 45.0, 0.001);
    let bare = square(15.002, 45.002, 0.0005);
    let a = setup.add("covered", &covered);
    let b = setup.add("bare", &bare);

    let catalog = FakeCatalog::default().list(&covered, vec![scene("T33TWM", 1.0)]);
    let report = setup.pipeline(catalog).run().unwrap();

    assert_eq!(report.completed, vec![a]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, b);
    assert_eq!(setup.pending(), vec![b]);
    assert!(!setup.layout.field_dir(b).exists());
}

#[test]
fn nothing_found_means_no_download() {
    let setup = Setup::new();
    let id = setup.add("bare", &square(15.0, 45.0, 0.001));

    let catalog = FakeCatalog::default();
    let log = catalog.log.clone();
    let report = setup.pipeline(catalog).run().unwrap();

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(setup.pending(), vec![id]);
    assert!(log.lock().unwrap().downloads.is_empty());
}

#[test]
fn boundary_outside_scene_stays_pending() {
    let setup = Setup::new();
    let inside = square(15.0, 45.0, 0.001);
    let outside = square(16.5, 44.0, 0.001);
    let a = setup.add("inside", &inside);
    let b = setup.add("outside", &outside);

    let tile = scene("T33TWM", 1.0);
    let catalog = FakeCatalog::default()
        .list(&inside, vec![tile.clone()])
        .list(&outside, vec![tile]);
    let report = setup.pipeline(catalog).run().unwrap();

    assert_eq!(report.completed, vec![a]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, b);
    assert!(report.skipped[0].1.contains("does not intersect"));
    assert_eq!(setup.pending(), vec![b]);
    assert!(!setup.layout.masked_path(b).exists());
}

#[test]
fn multi_granule_scene_skips_its_fields_only() {
    let setup = Setup::new();
    let single = square(15.0, 45.0, 0.001);
    let double = square(15.002, 45.002, 0.0005);
    let a = setup.add("single", &single);
    let b = setup.add("double", &double);

    let split = scene("T33TXM", 2.0);
    let catalog = FakeCatalog::default()
        .list(&single, vec![scene("T33TWM", 1.0)])
        .list(&double, vec![split.clone()])
        .with_archive(&split, archive(&split, &["L1C_A", "L1C_B"]));
    let report = setup.pipeline(catalog).run().unwrap();

    assert_eq!(report.scenes_downloaded, 2);
    assert_eq!(report.completed, vec![a]);
    assert!(report.skipped[0].1.contains("granules"));
    assert_eq!(setup.pending(), vec![b]);
}

#[test]
fn download_failure_aborts_and_cleans_staging() {
    let setup = Setup::new();
    let field = square(15.0, 45.0, 0.001);
    let id = setup.add("center", &field);

    let mut catalog = FakeCatalog::default().list(&field, vec![scene("T33TWM", 1.0)]);
    catalog.fail_downloads = true;
    fs::create_dir_all(&setup.config.staging_dir).unwrap();
    fs::write(setup.config.staging_dir.join("leftover.zip"), b"old").unwrap();

    let err = setup.pipeline(catalog).run().unwrap_err();

    assert!(matches!(err, PipelineError::AcquisitionFailed(_)));
    assert_eq!(setup.pending(), vec![id]);
    assert!(setup.staging_is_empty());
}

#[test]
fn fail_policy_leaves_stale_directory() {
    let mut setup = Setup::new();
    setup.config.artifact_policy = ArtifactPolicy::Fail;
    let field = square(15.0, 45.0, 0.001);
    let id = setup.add("center", &field);

    fs::create_dir_all(setup.layout.field_dir(id)).unwrap();
    fs::write(setup.layout.index_path(id), b"stale").unwrap();

    let catalog = FakeCatalog::default().list(&field, vec![scene("T33TWM", 1.0)]);
    let report = setup.pipeline(catalog).run().unwrap();

    assert!(report.completed.is_empty());
    assert_eq!(report.skipped[0].0, id);
    assert_eq!(fs::read(setup.layout.index_path(id)).unwrap(), b"stale");
    assert_eq!(setup.pending(), vec![id]);
}

#[test]
fn replace_policy_rebuilds_stale_directory() {
    let setup = Setup::new();
    let field = square(15.0, 45.0, 0.001);
    let id = setup.add("center", &field);

    fs::create_dir_all(setup.layout.field_dir(id)).unwrap();
    fs::write(setup.layout.field_dir(id).join("junk.txt"), b"stale").unwrap();

    let catalog = FakeCatalog::default().list(&field, vec![scene("T33TWM", 1.0)]);
    let report = setup.pipeline(catalog).run().unwrap();

    assert_eq!(report.completed, vec![id]);
    assert!(!setup.layout.field_dir(id).join("junk.txt").exists());
}

#[test]
fn cancelled_run_leaves_fields_pending() {
    let setup = Setup::new();
    let field = square(15.0, 45.0, 0.001);
    let id = setup.add("center", &field);

    let catalog = FakeCatalog::default().list(&field, vec![scene("T33TWM", 1.0)]);
    let pipeline = setup.pipeline(catalog);
    pipeline.cancel_token().cancel();

    assert!(matches!(pipeline.run(), Err(PipelineError::Cancelled)));
    assert_eq!(setup.pending(), vec![id]);
    assert!(setup.staging_is_empty());
}

#[test]
fn job_gate_admits_one_run_at_a_time() {
    let setup = Setup::new();
    let field = square(15.0, 45.0, 0.001);
    let id = setup.add("center", &field);

    let (release, held) = mpsc::channel();
    let mut slow = FakeCatalog::default().list(&field, vec![scene("T33TWM", 1.0)]);
    slow.hold = Some(Mutex::new(held));

    let gate = JobGate::new();
    assert_eq!(gate.submit(setup.pipeline(slow)).unwrap(), Submission::Accepted);
    assert!(gate.is_running());
    assert_eq!(
        gate.submit(setup.pipeline(FakeCatalog::default())).unwrap(),
        Submission::AlreadyRunning
    );

    release.send(()).unwrap();
    let report = gate.wait().unwrap().unwrap();
    assert_eq!(report.completed, vec![id]);
    assert!(!gate.is_running());

    assert_eq!(
        gate.submit(setup.pipeline(FakeCatalog::default())).unwrap(),
        Submission::Accepted
    );
    let again = gate.wait().unwrap().unwrap();
    assert_eq!(again.pending, 0);
}

#[test]
fn catalog_outage_aborts_before_download() {
    let setup = Setup::new();
    let west = square(14.999, 45.0, 0.0008);
    let east = square(15.001, 45.0, 0.0008);
    let a = setup.add("west", &west);
    let b = setup.add("east", &east);

    let mut catalog = FakeCatalog::default()
        .list(&west, vec![scene("T33TWM", 1.0)])
        .list(&east, vec![scene("T33TWM", 1.0)]);
    catalog.fail_search = true;
    let log = catalog.log.clone();
    fs::create_dir_all(&setup.config.staging_dir).unwrap();
    fs::write(setup.config.staging_dir.join("leftover.zip"), b"old").unwrap();

    let err = setup.pipeline(catalog).run().unwrap_err();

    assert!(matches!(err, PipelineError::CatalogUnavailable(_)));
    let log = log.lock().unwrap();
    assert_eq!(log.searches, 1);
    assert!(log.downloads.is_empty());
    assert_eq!(setup.pending(), vec![a, b]);
    assert!(!setup.layout.field_dir(a).exists());
    assert!(setup.staging_is_empty());
}

#[test]
fn overlong_boundary_is_skipped_while_others_complete() {
    let setup = Setup::new();
    let simple = square(15.0, 45.0, 0.001);
    let complex = jagged(15.0, 45.0, 400);
    let a = setup.add("simple", &simple);
    let b = setup.add("complex", &complex);

    let tile = scene("T33TWM", 1.0);
    let catalog = FakeCatalog::default()
        .list(&simple, vec![tile.clone()])
        .list(&complex, vec![tile]);
    let log = catalog.log.clone();

    let report = setup.pipeline(catalog).run().unwrap();

    assert_eq!(report.completed, vec![a]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, b);
    assert!(report.skipped[0].1.contains("3938"), "{}", report.skipped[0].1);
    // the long query never reaches the catalog
    assert_eq!(log.lock().unwrap().searches, 1);
    assert_eq!(setup.pending(), vec![b]);
    assert!(!setup.layout.field_dir(b).exists());
}

#[test]
fn staging_enclosing_artifacts_is_refused() {
    let mut setup = Setup::new();
    let field = square(15.0, 45.0, 0.001);
    let id = setup.add("center", &field);
    fs::create_dir_all(setup.layout.field_dir(id)).unwrap();
    fs::write(setup.layout.preview_file(id), b"png").unwrap();

    setup.config.staging_dir = setup.config.artifact_dir.join("..");
    let catalog = FakeCatalog::default();
    let err = Pipeline::new(setup.config.clone(), Box::new(catalog), setup.store.clone())
        .err()
        .unwrap();

    assert!(matches!(err, PipelineError::Config(_)));
    assert!(setup.layout.preview_path(id).is_some());
}
