//! In-process stand-ins for the engine's external collaborators.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use pagewise::export::{RemoteConnector, RemoteError, RemoteStore};
use pagewise::inference::{InferenceFailure, InferenceRequest, PageInference};
use pagewise::processor::{DocumentHandle, DocumentNormalizer, NormalizeError};

/// Resolves any `*.pdf` id except `missing*` to a document of
/// `page_count` pages; every page renders as a 400x300 gradient.
pub struct FakeNormalizer {
    pub page_count: u32,
    rasterized: Mutex<Vec<u32>>,
}

impl FakeNormalizer {
    pub fn new(page_count: u32) -> Arc<Self> {
        Arc::new(Self {
            page_count,
            rasterized: Mutex::new(Vec::new()),
        })
    }

    pub fn rasterized_pages(&self) -> Vec<u32> {
        self.rasterized.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentNormalizer for FakeNormalizer {
    async fn resolve(&self, file_id: &str) -> Result<DocumentHandle, NormalizeError> {
        if file_id.starts_with("missing") {
            return Err(NormalizeError::NotFound(file_id.to_string()));
        }
        if !file_id.ends_with(".pdf") {
            return Err(NormalizeError::UnsupportedFormat(file_id.to_string()));
        }
        Ok(DocumentHandle {
            file_id: file_id.to_string(),
            location: PathBuf::from("/uploads").join(file_id),
            page_count: self.page_count,
        })
    }

    async fn rasterize(
        &self,
        _doc: &DocumentHandle,
        page: u32,
        _dpi: u32,
    ) -> Result<Vec<u8>, NormalizeError> {
        self.rasterized.lock().unwrap().push(page);
        let img = RgbImage::from_fn(400, 300, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y + page) % 256) as u8])
        });
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        Ok(buf)
    }
}

/// One scripted inference call.
pub enum Step {
    Reply(Result<String, InferenceFailure>),
    /// Never answers within any sane attempt timeout.
    Hang,
    /// Waits until every holder of the barrier has arrived, then answers.
    Gate(Arc<tokio::sync::Barrier>),
}

/// A recorded inference request.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub model: String,
    pub user: String,
    pub image_bytes: usize,
}

/// Plays back `Step`s in order, then answers `"page text"`.
#[derive(Default)]
pub struct ScriptedInference {
    steps: Mutex<VecDeque<Step>>,
    seen: Mutex<Vec<SeenRequest>>,
}

impl ScriptedInference {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, step: Step) {
        self.steps.lock().unwrap().push_back(step);
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageInference for ScriptedInference {
    async fn infer(&self, request: &InferenceRequest) -> Result<String, InferenceFailure> {
        self.seen.lock().unwrap().push(SeenRequest {
            model: request.model.clone(),
            user: request.user.clone(),
            image_bytes: request.image_jpeg.len(),
        });
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply(result)) => result,
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok("too late".to_string())
            }
            Some(Step::Gate(barrier)) => {
                barrier.wait().await;
                Ok("page text".to_string())
            }
            None => Ok("page text".to_string()),
        }
    }
}

/// A recorded upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub site_url: String,
    pub folder: String,
    pub filename: String,
    pub bytes: usize,
}

/// Remote store that records uploads, or rejects them all.
#[derive(Default)]
pub struct RecordingRemote {
    pub fail_uploads: bool,
    connects: AtomicUsize,
    uploads: Mutex<Vec<Upload>>,
}

impl RecordingRemote {
    pub fn working() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_uploads: true,
            ..Default::default()
        })
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

struct SiteSession {
    site_url: String,
    remote: Arc<RecordingRemote>,
}

impl RemoteStore for SiteSession {
    fn folder_exists(&self, _folder: &str) -> Result<bool, RemoteError> {
        Ok(true)
    }

    fn create_folder(&self, _folder: &str) -> Result<(), RemoteError> {
        Ok(())
    }

    fn upload_overwrite(
        &self,
        folder: &str,
        filename: &str,
        content: &[u8],
    ) -> Result<String, RemoteError> {
        if self.remote.fail_uploads {
            return Err(RemoteError::Http {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        self.remote.uploads.lock().unwrap().push(Upload {
            site_url: self.site_url.clone(),
            folder: folder.to_string(),
            filename: filename.to_string(),
            bytes: content.len(),
        });
        Ok(format!("/{}/{}", folder, filename))
    }
}

/// Connector wrapper so a test can keep its own handle on the recorder.
pub struct RecordingConnector(pub Arc<RecordingRemote>);

impl RemoteConnector for RecordingConnector {
    fn connect(&self, site_url: &str) -> Result<Arc<dyn RemoteStore>, RemoteError> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(SiteSession {
            site_url: site_url.to_string(),
            remote: Arc::clone(&self.0),
        }))
    }
}
