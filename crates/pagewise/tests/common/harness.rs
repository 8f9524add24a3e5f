//! Test harness for isolated engine runs.
//!
//! Each `TestHarness` owns an in-memory job store, a temporary export
//! directory and the fakes it was built with.

#![allow(dead_code)]

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use pagewise::db::Database;
use pagewise::export::{ExportRouter, LocalStaging, RemoteConnector, RouterSettings};
use pagewise::processor::{PayloadLimits, ProcessorSettings};
use pagewise::{Engine, EngineSettings, JobStore, RetryPolicy};

use super::fakes::{FakeNormalizer, RecordingConnector, RecordingRemote, ScriptedInference, Step};

/// Knobs for building a harness.
pub struct HarnessOptions {
    pub page_count: u32,
    pub steps: Vec<Step>,
    pub remote: Option<Arc<RecordingRemote>>,
    pub attempt_timeout: Duration,
    pub max_attempts: u32,
    pub chunk_target: usize,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            page_count: 10,
            steps: Vec::new(),
            remote: None,
            attempt_timeout: Duration::from_millis(200),
            max_attempts: 3,
            chunk_target: 26_140,
        }
    }
}

/// An engine wired to fakes, with handles on each fake.
pub struct TestHarness {
    temp_dir: TempDir,
    pub export_dir: PathBuf,
    pub engine: Engine,
    pub normalizer: Arc<FakeNormalizer>,
    pub inference: Arc<ScriptedInference>,
    pub remote: Option<Arc<RecordingRemote>>,
}

impl TestHarness {
    /// Ten-page documents, no remote store, default replies.
    pub fn new() -> Self {
        Self::with_options(HarnessOptions::default())
    }

    pub fn with_options(options: HarnessOptions) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let export_dir = temp_dir.path().join("exports");
        Self::build(temp_dir, export_dir, options)
    }

    /// Points the export directory at a regular file so every local write
    /// fails.
    pub fn with_broken_export_dir(options: HarnessOptions) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let export_dir = temp_dir.path().join("not-a-dir");
        std::fs::write(&export_dir, b"blocker").expect("Failed to write blocker file");
        Self::build(temp_dir, export_dir, options)
    }

    fn build(temp_dir: TempDir, export_dir: PathBuf, options: HarnessOptions) -> Self {
        let store = JobStore::new(
            Database::open_in_memory().expect("Failed to open in-memory database"),
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
            },
        );

        let normalizer = FakeNormalizer::new(options.page_count);
        let inference = ScriptedInference::new(options.steps);

        let connector = options
            .remote
            .clone()
            .map(|remote| Arc::new(RecordingConnector(remote)) as Arc<dyn RemoteConnector>);
        let router = ExportRouter::new(
            LocalStaging::new(&export_dir),
            connector,
            &RouterSettings {
                upload_timeout: Duration::from_secs(5),
                upload_workers: 2,
                session_ttl: Duration::from_secs(60),
            },
        );

        let settings = ProcessorSettings {
            dpi: 200,
            limits: PayloadLimits {
                max_bytes: 4 * 1024 * 1024,
                min_edge_px: 32,
            },
            retry_quality: 85,
            attempt_timeout: options.attempt_timeout,
            max_attempts: options.max_attempts,
            system_prompt: "Transcribe the page.".to_string(),
            temperature: 0.0,
        };

        let engine = Engine::new(
            store,
            normalizer.clone(),
            inference.clone(),
            settings,
            router,
            EngineSettings {
                chunk_target: options.chunk_target,
                default_model: "gpt-4.1".to_string(),
            },
        );

        Self {
            temp_dir,
            export_dir,
            engine,
            normalizer,
            inference,
            remote: options.remote,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Maps a `downloads/<sub-id>/<file>` location to its file on disk.
    pub fn local_file(&self, download_path: &str) -> PathBuf {
        let relative = download_path
            .strip_prefix("downloads/")
            .expect("location is not a download path");
        self.export_dir.join(relative)
    }

    /// Reads the worksheet XML out of an exported workbook.
    pub fn sheet_xml(&self, download_path: &str) -> String {
        let file = std::fs::File::open(self.local_file(download_path))
            .expect("Failed to open exported workbook");
        let mut archive = zip::ZipArchive::new(file).expect("Export is not a zip archive");
        let mut sheet = archive
            .by_name("xl/worksheets/sheet1.xml")
            .expect("Workbook has no first sheet");
        let mut xml = String::new();
        sheet.read_to_string(&mut xml).expect("Sheet is not UTF-8");
        xml
    }
}

/// Byte offset of `needle` in `haystack`, panicking if absent.
pub fn position_of(haystack: &str, needle: &str) -> usize {
    haystack
        .find(needle)
        .unwrap_or_else(|| panic!("'{}' not found", needle))
}
