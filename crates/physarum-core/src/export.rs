use crate::color::ColorMapper;
use crate::field::FieldSnapshot;
use image::imageops::FilterType;
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::{error::Error, fmt, fs, io};
use tracing::{debug, info, warn};

/// Largest accepted screenshot axis in pixels.
pub const MAX_EXPORT_AXIS: u32 = 16_384;
/// Frames buffered between the session and the recording writer.
pub const RECORDING_QUEUE: usize = 8;

#[derive(Debug)]
pub enum ExportError {
    InvalidSize { width: u32, height: u32 },
    InProgress,
    Encode(image::ImageError),
    Io { path: PathBuf, source: io::Error },
    WorkerPanicked,
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::InvalidSize { width, height } => write!(
                f,
                "export size {width}x{height} must be non-empty and at most {MAX_EXPORT_AXIS} per axis"
            ),
            ExportError::InProgress => write!(f, "an export is already in progress"),
            ExportError::Encode(e) => write!(f, "failed to encode image: {e}"),
            ExportError::Io { path, source } => write!(f, "{}: {source}", path.display()),
            ExportError::WorkerPanicked => write!(f, "export worker panicked"),
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ExportError::Encode(e) => Some(e),
            ExportError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<image::ImageError> for ExportError {
    fn from(e: image::ImageError) -> Self {
        ExportError::Encode(e)
    }
}

/// RGBA pixels of a snapshot at simulation resolution.
pub fn render_snapshot(snapshot: &FieldSnapshot, mapper: &ColorMapper) -> RgbaImage {
    let dims = snapshot.dims;
    let mut pixels = vec![0u8; dims.cell_count() * 4];
    mapper.render(&snapshot.data, dims, &mut pixels);
    RgbaImage::from_raw(dims.cols as u32, dims.rows as u32, pixels)
        .unwrap_or_else(|| RgbaImage::new(dims.cols as u32, dims.rows as u32))
}

pub fn check_export_size(width: u32, height: u32) -> Result<(), ExportError> {
    if width == 0 || height == 0 || width > MAX_EXPORT_AXIS || height > MAX_EXPORT_AXIS {
        return Err(ExportError::InvalidSize { width, height });
    }
    Ok(())
}

/// Render, resample to `width x height`, and encode as PNG.
pub fn encode_png(
    snapshot: &FieldSnapshot,
    mapper: &ColorMapper,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, ExportError> {
    check_export_size(width, height)?;
    let mut image = render_snapshot(snapshot, mapper);
    if image.dimensions() != (width, height) {
        image = image::imageops::resize(&image, width, height, FilterType::Triangle);
    }
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Single-slot in-flight flag shared with export workers.
#[derive(Clone, Debug, Default)]
pub struct ExportGuard {
    busy: Arc<AtomicBool>,
}

impl ExportGuard {
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Claim the slot. The returned ticket frees it when dropped, on success, error, or panic.
    pub fn try_acquire(&self) -> Option<ExportTicket> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ExportTicket {
                busy: Arc::clone(&self.busy),
            })
    }
}

#[derive(Debug)]
pub struct ExportTicket {
    busy: Arc<AtomicBool>,
}

impl Drop for ExportTicket {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// A screenshot being encoded in the background from a [`FieldSnapshot`], so later ticks
/// and reallocations never touch the pixels being encoded.
#[derive(Debug)]
pub struct ExportHandle {
    worker: JoinHandle<Result<Vec<u8>, ExportError>>,
}

impl ExportHandle {
    /// Start encoding `snapshot` on a worker thread while holding `ticket`.
    pub fn spawn(
        ticket: ExportTicket,
        snapshot: FieldSnapshot,
        mapper: Arc<ColorMapper>,
        width: u32,
        height: u32,
    ) -> Self {
        let worker = thread::spawn(move || {
            let _ticket = ticket;
            let result = encode_png(&snapshot, &mapper, width, height);
            match &result {
                Ok(bytes) => info!(width, height, bytes = bytes.len(), "screenshot encoded"),
                Err(e) => warn!(width, height, error = %e, "screenshot export failed"),
            }
            result
        });
        Self { worker }
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Block until the PNG bytes are ready.
    pub fn wait(self) -> Result<Vec<u8>, ExportError> {
        self.worker.join().map_err(|_| ExportError::WorkerPanicked)?
    }

    /// Wait and write the PNG to `path`.
    pub fn save(self, path: &Path) -> Result<usize, ExportError> {
        let bytes = self.wait()?;
        fs::write(path, &bytes).map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(bytes.len())
    }
}

struct RecordedFrame {
    snapshot: FieldSnapshot,
    mapper: Arc<ColorMapper>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordingSummary {
    pub dir: PathBuf,
    pub frames_written: usize,
    pub frames_dropped: usize,
}

/// Result of handing one frame to a [`FrameRecorder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureOutcome {
    Queued,
    /// The writer is behind; the frame was discarded and counted.
    Dropped,
    /// The writer thread has exited. No further frame can be written.
    WriterStopped,
}

/// Streams captured frames to a numbered PNG sequence on a writer thread.
pub struct FrameRecorder {
    dir: PathBuf,
    sender: SyncSender<RecordedFrame>,
    writer: JoinHandle<Result<usize, ExportError>>,
    dropped: usize,
}

impl FrameRecorder {
    pub fn start(dir: impl Into<PathBuf>) -> Result<Self, ExportError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| ExportError::Io {
            path: dir.clone(),
            source,
        })?;
        let (sender, receiver) = mpsc::sync_channel::<RecordedFrame>(RECORDING_QUEUE);
        let out_dir = dir.clone();
        let writer = thread::spawn(move || -> Result<usize, ExportError> {
            let mut written = 0usize;
            for frame in receiver {
                let path = out_dir.join(format!("frame_{written:05}.png"));
                render_snapshot(&frame.snapshot, &frame.mapper)
                    .save_with_format(&path, ImageFormat::Png)?;
                written += 1;
            }
            Ok(written)
        });
        info!(dir = %dir.display(), "recording started");
        Ok(Self {
            dir,
            sender,
            writer,
            dropped: 0,
        })
    }

    /// Queue one frame without blocking.
    pub fn capture(&mut self, snapshot: FieldSnapshot, mapper: Arc<ColorMapper>) -> CaptureOutcome {
        match self.sender.try_send(RecordedFrame { snapshot, mapper }) {
            Ok(()) => CaptureOutcome::Queued,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                debug!(dropped = self.dropped, "recording frame dropped");
                CaptureOutcome::Dropped
            }
            Err(TrySendError::Disconnected(_)) => CaptureOutcome::WriterStopped,
        }
    }

    pub fn frames_dropped(&self) -> usize {
        self.dropped
    }

    /// Close the queue and wait for the writer to flush.
    pub fn finish(self) -> Result<RecordingSummary, ExportError> {
        let FrameRecorder {
            dir,
            sender,
            writer,
            dropped,
        } = self;
        drop(sender);
        let frames_written = writer.join().map_err(|_| ExportError::WorkerPanicked)??;
        info!(
            dir = %dir.display(),
            frames_written,
            frames_dropped = dropped,
            "recording finished"
        );
        Ok(RecordingSummary {
            dir,
            frames_written,
            frames_dropped: dropped,
        })
    }
}

/// A recording being flushed in the background.
pub struct RecordingHandle {
    worker: JoinHandle<Result<RecordingSummary, ExportError>>,
}

impl RecordingHandle {
    pub fn spawn(recorder: FrameRecorder) -> Self {
        Self {
            worker: thread::spawn(move || recorder.finish()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub fn wait(self) -> Result<RecordingSummary, ExportError> {
        self.worker.join().map_err(|_| ExportError::WorkerPanicked)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColorPreset;
    use crate::field::{GridDimensions, TrailField};

    fn mapper() -> Arc<ColorMapper> {
        Arc::new(ColorMapper::new([
            ColorPreset::Neon,
            ColorPreset::Fire,
            ColorPreset::Ocean,
        ]))
    }

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("physarum-export-{tag}-{}", std::process::id()))
    }

    #[test]
    fn guard_allows_one_export_at_a_time() {
        let guard = ExportGuard::default();
        let ticket = guard.try_acquire().unwrap();
        assert!(guard.is_busy());
        assert!(guard.try_acquire().is_none());
        drop(ticket);
        assert!(!guard.is_busy());
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn screenshot_is_resampled_png() {
        let mut field = TrailField::new(GridDimensions::new(16, 8));
        field.set(0, 3, 3, 255);
        let guard = ExportGuard::default();
        let handle = ExportHandle::spawn(
            guard.try_acquire().unwrap(),
            field.snapshot(),
            mapper(),
            40,
            30,
        );
        let bytes = handle.wait().unwrap();
        assert!(!guard.is_busy());
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 30));
    }

    #[test]
    fn failed_export_releases_the_guard() {
        let field = TrailField::new(GridDimensions::new(4, 4));
        let guard = ExportGuard::default();
        let handle = ExportHandle::spawn(
            guard.try_acquire().unwrap(),
            field.snapshot(),
            mapper(),
            0,
            10,
        );
        assert!(matches!(
            handle.wait(),
            Err(ExportError::InvalidSize { width: 0, height: 10 })
        ));
        assert!(!guard.is_busy());
    }

    #[test]
    fn recorder_writes_numbered_frames() {
        let dir = temp_dir("frames");
        let _ = fs::remove_dir_all(&dir);
        let field = TrailField::new(GridDimensions::new(8, 8));
        let mut recorder = FrameRecorder::start(&dir).unwrap();
        let mut queued = 0;
        for _ in 0..3 {
            if recorder.capture(field.snapshot(), mapper()) == CaptureOutcome::Queued {
                queued += 1;
            }
        }
        let summary = RecordingHandle::spawn(recorder).wait().unwrap();
        assert_eq!(summary.frames_written, queued);
        assert_eq!(summary.frames_written + summary.frames_dropped, 3);
        assert!(dir.join("frame_00000.png").exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn dead_writer_is_reported_and_surfaces_its_error() {
        let dir = temp_dir("dead-writer");
        let _ = fs::remove_dir_all(&dir);
        let field = TrailField::new(GridDimensions::new(8, 8));
        let mut recorder = FrameRecorder::start(&dir).unwrap();
        fs::remove_dir_all(&dir).unwrap();

        let mut outcome = CaptureOutcome::Queued;
        for _ in 0..500 {
            outcome = recorder.capture(field.snapshot(), mapper());
            if outcome == CaptureOutcome::WriterStopped {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(2));
        }
        assert_eq!(outcome, CaptureOutcome::WriterStopped);
        assert!(recorder.finish().is_err());
    }
}
