// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Session orchestrator — the Empty/Scanning/Ready/Editing state machine.
//
// Only one scan or replace runs at a time per session; a second request made
// while one is in flight fails with `Busy`. The pipeline work itself runs on
// the blocking pool with the state lock released, so `reset()` can always
// get in. Every operation remembers the epoch it started in, and a result
// that comes back after a reset is discarded with `Superseded`.

use std::sync::Arc;

use qrswap_core::config::PipelineConfig;
use qrswap_core::error::{QrSwapError, Result};
use qrswap_core::human_errors::{HumanError, humanize_error};
use qrswap_core::types::{Detection, DetectionId, MediaKind};
use qrswap_document::{QrPipeline, ReplaceOutcome, ScanOutcome};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::artifact::{ModifiedArtifact, SourceArtifact};
use crate::registry::EditRegistry;
use crate::resources::{Resource, ResourceHandle, ResourceKind, ResourceTable};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// No artifact loaded.
    Empty,
    /// A scan is in flight.
    Scanning,
    /// Detections and a preview are available.
    Ready,
    /// A replace is in flight.
    Editing,
}

/// What a scan hands back to the front end.
#[derive(Debug, Clone, Serialize)]
pub struct ScanView {
    pub page: u32,
    pub page_count: Option<u32>,
    pub detections: Vec<Detection>,
    /// Page content that could not be rendered; codes there were not searched.
    pub skipped_content: usize,
    /// PNG of the scanned page.
    pub preview: ResourceHandle,
}

/// What a replace hands back to the front end.
#[derive(Debug, Clone, Serialize)]
pub struct ReplaceView {
    pub edited: DetectionId,
    pub kind: MediaKind,
    /// The modified artifact, in `kind`.
    pub artifact: ResourceHandle,
    pub digest: String,
    /// PNG of the edited page.
    pub preview: ResourceHandle,
}

/// Scan result plus its preview already encoded off the async thread.
struct Scanned {
    outcome: ScanOutcome,
    png: Vec<u8>,
}

struct Inner {
    state: SessionState,
    epoch: u64,
    source: Option<SourceArtifact>,
    modified: Option<ModifiedArtifact>,
    page: u32,
    page_count: Option<u32>,
    detections: Vec<Detection>,
    selection: Option<DetectionId>,
    edits: EditRegistry,
    resources: ResourceTable,
    preview: Option<ResourceHandle>,
    artifact: Option<ResourceHandle>,
    last_error: Option<HumanError>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: SessionState::Empty,
            epoch: 0,
            source: None,
            modified: None,
            page: 0,
            page_count: None,
            detections: Vec::new(),
            selection: None,
            edits: EditRegistry::new(),
            resources: ResourceTable::new(),
            preview: None,
            artifact: None,
            last_error: None,
        }
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.state {
            SessionState::Scanning | SessionState::Editing => Err(QrSwapError::Busy),
            SessionState::Empty | SessionState::Ready => Ok(()),
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state {
            SessionState::Ready => Ok(()),
            SessionState::Empty => Err(QrSwapError::NotLoaded),
            SessionState::Scanning | SessionState::Editing => Err(QrSwapError::Busy),
        }
    }

    /// Drop all session data and start a new epoch. Returns released handles.
    fn clear(&mut self) -> usize {
        self.epoch += 1;
        self.state = SessionState::Empty;
        self.source = None;
        self.modified = None;
        self.page = 0;
        self.page_count = None;
        self.detections.clear();
        self.selection = None;
        self.edits.clear();
        self.preview = None;
        self.artifact = None;
        self.resources.release_all()
    }

    /// The latest modified artifact, or the source if nothing was edited yet.
    fn working(&self) -> Result<(MediaKind, Arc<[u8]>)> {
        if let Some(modified) = &self.modified {
            return Ok((modified.kind, Arc::clone(&modified.bytes)));
        }
        self.source
            .as_ref()
            .map(|src| (src.kind, Arc::clone(&src.bytes)))
            .ok_or(QrSwapError::NotLoaded)
    }

    fn detection(&self, id: &DetectionId) -> Result<&Detection> {
        self.detections
            .iter()
            .find(|d| d.id == *id)
            .ok_or(QrSwapError::UnknownDetection(*id))
    }

    fn swap_handle(&mut self, slot: Slot, handle: ResourceHandle) {
        let old = match slot {
            Slot::Preview => self.preview.replace(handle),
            Slot::Artifact => self.artifact.replace(handle),
        };
        if let Some(old) = old {
            self.resources.release(&old);
        }
    }

    fn apply_scan(&mut self, scanned: Scanned) -> ScanView {
        let handle = self
            .resources
            .insert(ResourceKind::Preview, MediaKind::Png, scanned.png.into());
        self.swap_handle(Slot::Preview, handle);

        let outcome = scanned.outcome;
        let skipped_content = outcome.preview.skipped;
        self.page = outcome.preview.page;
        self.page_count = outcome.page_count;
        self.detections = outcome.detections;
        self.selection = None;
        self.state = SessionState::Ready;

        ScanView {
            page: self.page,
            page_count: self.page_count,
            detections: self.detections.clone(),
            skipped_content,
            preview: handle,
        }
    }

    fn record_failure(&mut self, err: &QrSwapError) {
        warn!(error = %err, state = ?self.state, "Session operation failed");
        self.last_error = Some(humanize_error(err));
    }
}

#[derive(Clone, Copy)]
enum Slot {
    Preview,
    Artifact,
}

/// One user's document session. Cloning shares the session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Mutex<Inner>>,
    pipeline: Arc<QrPipeline>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl Session {
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_pipeline(QrPipeline::new(config))
    }

    /// Session driving a preconfigured pipeline (custom rasterizer or detector).
    pub fn with_pipeline(pipeline: QrPipeline) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::new())),
            pipeline: Arc::new(pipeline),
        }
    }

    // -- Operations -----------------------------------------------------------

    /// Reset the session, take ownership of `source`, and scan its first page.
    ///
    /// On failure the session is left Empty.
    #[instrument(skip_all, fields(name = %source.name, kind = %source.kind))]
    pub async fn load(&self, source: SourceArtifact) -> Result<ScanView> {
        let (epoch, kind, bytes) = {
            let mut inner = self.inner.lock().await;
            inner.ensure_idle()?;
            inner.clear();
            inner.last_error = None;
            let job = (inner.epoch, source.kind, Arc::clone(&source.bytes));
            inner.source = Some(source);
            inner.state = SessionState::Scanning;
            job
        };

        let result = self.scan_blocking(kind, bytes, 1).await;

        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            info!("Load superseded by reset; result discarded");
            return Err(QrSwapError::Superseded);
        }
        match result {
            Ok(scanned) => {
                let view = inner.apply_scan(scanned);
                info!(
                    detections = view.detections.len(),
                    page_count = ?view.page_count,
                    skipped_content = view.skipped_content,
                    "Artifact loaded"
                );
                Ok(view)
            }
            Err(err) => {
                inner.clear();
                inner.record_failure(&err);
                Err(err)
            }
        }
    }

    /// Scan another page of the working artifact, clearing the selection.
    ///
    /// On failure the previous page view stays in place.
    #[instrument(skip(self))]
    pub async fn goto_page(&self, page: u32) -> Result<ScanView> {
        let (epoch, kind, bytes) = {
            let mut inner = self.inner.lock().await;
            inner.ensure_ready()?;
            let (kind, bytes) = inner.working()?;
            inner.state = SessionState::Scanning;
            (inner.epoch, kind, bytes)
        };

        let result = self.scan_blocking(kind, bytes, page).await;

        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            info!("Page scan superseded by reset; result discarded");
            return Err(QrSwapError::Superseded);
        }
        match result {
            Ok(scanned) => {
                let view = inner.apply_scan(scanned);
                info!(detections = view.detections.len(), "Page scanned");
                Ok(view)
            }
            Err(err) => {
                inner.state = SessionState::Ready;
                inner.record_failure(&err);
                Err(err)
            }
        }
    }

    /// Replace the code `id` on the current page with one encoding `text`.
    ///
    /// Works on the working artifact, so successive edits accumulate. On
    /// failure the registry, artifact and handles are left untouched.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub async fn replace(&self, id: DetectionId, text: &str) -> Result<ReplaceView> {
        let (epoch, kind, bytes, detection, page) = {
            let mut inner = self.inner.lock().await;
            inner.ensure_ready()?;
            let detection = inner.detection(&id)?.clone();
            let (kind, bytes) = inner.working()?;
            inner.state = SessionState::Editing;
            (inner.epoch, kind, bytes, detection, inner.page)
        };

        let original = detection.payload.clone();
        let pipeline = Arc::clone(&self.pipeline);
        let new_text = text.to_owned();
        let result = run_blocking(move || {
            let outcome: ReplaceOutcome = pipeline.replace(&bytes, kind, &detection, &new_text, page)?;
            let png = outcome.preview.to_png_bytes()?;
            Ok((outcome, png))
        })
        .await;

        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            info!("Replace superseded by reset; result discarded");
            return Err(QrSwapError::Superseded);
        }
        match result {
            Ok((outcome, png)) => {
                let modified = ModifiedArtifact::new(outcome.kind, outcome.bytes, id);
                let artifact = inner.resources.insert(
                    ResourceKind::Artifact,
                    modified.kind,
                    Arc::clone(&modified.bytes),
                );
                inner.swap_handle(Slot::Artifact, artifact);
                let preview = inner
                    .resources
                    .insert(ResourceKind::Preview, MediaKind::Png, png.into());
                inner.swap_handle(Slot::Preview, preview);

                inner.edits.record(id, &original, text);
                let view = ReplaceView {
                    edited: id,
                    kind: modified.kind,
                    artifact,
                    digest: modified.digest.clone(),
                    preview,
                };
                inner.modified = Some(modified);
                inner.state = SessionState::Ready;
                info!(%id, digest = %view.digest, "Code replaced");
                Ok(view)
            }
            Err(err) => {
                inner.state = SessionState::Ready;
                inner.record_failure(&err);
                Err(err)
            }
        }
    }

    /// Drop everything and release every handle. Always succeeds, even while
    /// an operation is in flight; that operation's result is then discarded.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        let released = inner.clear();
        inner.last_error = None;
        info!(released, "Session reset");
    }

    /// Mark a detection on the current page as selected.
    pub async fn select(&self, id: DetectionId) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.ensure_ready()?;
        inner.detection(&id)?;
        inner.selection = Some(id);
        Ok(())
    }

    async fn scan_blocking(&self, kind: MediaKind, bytes: Arc<[u8]>, page: u32) -> Result<Scanned> {
        let pipeline = Arc::clone(&self.pipeline);
        run_blocking(move || {
            let outcome = pipeline.scan(&bytes, kind, page)?;
            let png = outcome.preview.to_png_bytes()?;
            Ok(Scanned { outcome, png })
        })
        .await
    }

    // -- Accessors ------------------------------------------------------------

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn selection(&self) -> Option<DetectionId> {
        self.inner.lock().await.selection
    }

    pub async fn detections(&self) -> Vec<Detection> {
        self.inner.lock().await.detections.clone()
    }

    /// Current text of a code: the edited text if any, else the decoded payload.
    pub async fn payload_of(&self, id: &DetectionId) -> Option<String> {
        let inner = self.inner.lock().await;
        if let Some(record) = inner.edits.get(id) {
            return Some(record.text.clone());
        }
        inner.detection(id).ok().map(|d| d.payload.clone())
    }

    pub async fn edits(&self) -> EditRegistry {
        self.inner.lock().await.edits.clone()
    }

    /// 1-based page currently shown, or `None` when nothing is loaded.
    pub async fn page(&self) -> Option<u32> {
        let inner = self.inner.lock().await;
        (inner.page > 0).then_some(inner.page)
    }

    pub async fn page_count(&self) -> Option<u32> {
        self.inner.lock().await.page_count
    }

    pub async fn source(&self) -> Option<SourceArtifact> {
        self.inner.lock().await.source.clone()
    }

    pub async fn modified(&self) -> Option<ModifiedArtifact> {
        self.inner.lock().await.modified.clone()
    }

    /// Digest of the artifact the next replace will edit.
    pub async fn working_digest(&self) -> Option<String> {
        let inner = self.inner.lock().await;
        match (&inner.modified, &inner.source) {
            (Some(modified), _) => Some(modified.digest.clone()),
            (None, Some(source)) => Some(source.digest.clone()),
            (None, None) => None,
        }
    }

    pub async fn resource(&self, handle: &ResourceHandle) -> Option<Resource> {
        self.inner.lock().await.resources.get(handle).cloned()
    }

    pub async fn live_resources(&self) -> usize {
        self.inner.lock().await.resources.live_count()
    }

    /// User-facing form of the most recent failure.
    pub async fn last_error(&self) -> Option<HumanError> {
        self.inner.lock().await.last_error.clone()
    }
}

async fn run_blocking<T, F>(job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|err| QrSwapError::Canvas(format!("worker task failed: {err}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use qrswap_core::human_errors::Severity;
    use qrswap_document::{DetectorOutput, QrDetector};
    use std::sync::mpsc;
    use std::time::Duration;

    fn white_png() -> SourceArtifact {
        let raster = RgbaImage::from_pixel(40, 40, Rgba([255, 255, 255, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(raster)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png");
        SourceArtifact::from_bytes("blank.png", "image/png", bytes).expect("png source")
    }

    /// One-page PDF whose only content is a shading the built-in rasterizer
    /// cannot draw.
    fn shaded_pdf() -> SourceArtifact {
        use lopdf::{Document, Object, Stream, dictionary};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(dictionary! {}, b"/Sh0 sh".to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(100), Object::Integer(100)],
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("save pdf");
        SourceArtifact::from_bytes("shaded.pdf", "application/pdf", bytes).expect("pdf source")
    }

    /// Detector that blocks until the test lets it go.
    struct Gate(std::sync::Mutex<mpsc::Receiver<()>>);

    impl QrDetector for Gate {
        fn detect(&self, _: &RgbaImage) -> Result<DetectorOutput> {
            let rx = self
                .0
                .lock()
                .map_err(|_| QrSwapError::Canvas("gate poisoned".into()))?;
            let _ = rx.recv();
            Ok(DetectorOutput::Nothing)
        }
    }

    async fn wait_for(session: &Session, state: SessionState) {
        for _ in 0..500 {
            if session.state().await == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("session never reached {state:?}");
    }

    #[tokio::test]
    async fn empty_session_rejects_operations() {
        let session = Session::default();
        assert_eq!(session.state().await, SessionState::Empty);
        assert!(matches!(session.goto_page(1).await, Err(QrSwapError::NotLoaded)));
        let id = DetectionId { scan: 1, index: 0 };
        assert!(matches!(session.replace(id, "x").await, Err(QrSwapError::NotLoaded)));
        assert!(matches!(session.select(id).await, Err(QrSwapError::NotLoaded)));
        assert_eq!(session.page().await, None);
    }

    #[tokio::test]
    async fn undrawn_content_is_reported_in_the_view() {
        let pipeline = QrPipeline::default()
            .with_rasterizer(Box::new(qrswap_document::LopdfRasterizer));
        let session = Session::with_pipeline(pipeline);
        let view = session.load(shaded_pdf()).await.expect("load");
        assert!(view.detections.is_empty());
        assert_eq!(view.page_count, Some(1));
        assert_eq!(view.skipped_content, 1);
    }

    #[tokio::test]
    async fn blank_image_loads_with_no_detections() {
        let session = Session::default();
        let view = session.load(white_png()).await.expect("load");
        assert!(view.detections.is_empty());
        assert_eq!(view.page, 1);
        assert_eq!(view.page_count, None);
        assert_eq!(view.skipped_content, 0);
        assert_eq!(session.state().await, SessionState::Ready);
        assert_eq!(session.live_resources().await, 1);

        let preview = session.resource(&view.preview).await.expect("preview live");
        assert_eq!(preview.kind, ResourceKind::Preview);
        assert!(preview.bytes.starts_with(b"\x89PNG"));
    }

    #[tokio::test]
    async fn failed_load_leaves_session_empty() {
        let session = Session::default();
        let junk = SourceArtifact::from_bytes("x.pdf", "application/pdf", b"junk".to_vec())
            .expect("declared pdf");
        let err = session.load(junk).await.unwrap_err();
        assert!(matches!(err, QrSwapError::Decode(_)));
        assert_eq!(session.state().await, SessionState::Empty);
        assert!(session.source().await.is_none());
        assert_eq!(session.live_resources().await, 0);
        let human = session.last_error().await.expect("error recorded");
        assert_eq!(human.severity, Severity::Permanent);
    }

    #[tokio::test]
    async fn image_page_two_keeps_previous_view() {
        let session = Session::default();
        let first = session.load(white_png()).await.expect("load");
        let err = session.goto_page(2).await.unwrap_err();
        assert!(matches!(err, QrSwapError::PageRange { page: 2, page_count: 1 }));
        assert_eq!(session.state().await, SessionState::Ready);
        assert_eq!(session.page().await, Some(1));
        assert!(session.resource(&first.preview).await.is_some());
        assert!(session.last_error().await.is_some());
    }

    #[tokio::test]
    async fn unknown_detection_is_rejected() {
        let session = Session::default();
        session.load(white_png()).await.expect("load");
        let id = DetectionId { scan: u64::MAX, index: 0 };
        assert!(matches!(
            session.select(id).await,
            Err(QrSwapError::UnknownDetection(_))
        ));
        assert!(matches!(
            session.replace(id, "x").await,
            Err(QrSwapError::UnknownDetection(_))
        ));
        assert_eq!(session.state().await, SessionState::Ready);
    }

    #[tokio::test]
    async fn reset_supersedes_in_flight_scan() {
        let (tx, rx) = mpsc::channel();
        let pipeline = QrPipeline::default().with_detector(Box::new(Gate(std::sync::Mutex::new(rx))));
        let session = Session::with_pipeline(pipeline);

        let task = tokio::spawn({
            let session = session.clone();
            async move { session.load(white_png()).await }
        });
        wait_for(&session, SessionState::Scanning).await;

        assert!(matches!(session.load(white_png()).await, Err(QrSwapError::Busy)));
        assert!(matches!(session.goto_page(1).await, Err(QrSwapError::Busy)));

        session.reset().await;
        assert_eq!(session.state().await, SessionState::Empty);
        tx.send(()).expect("release gate");

        let result = task.await.expect("join");
        assert!(matches!(result, Err(QrSwapError::Superseded)));
        assert_eq!(session.state().await, SessionState::Empty);
        assert_eq!(session.live_resources().await, 0);
        assert!(session.last_error().await.is_none());
    }
}
