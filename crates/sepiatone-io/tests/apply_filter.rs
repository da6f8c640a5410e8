//! Integration tests: drive `Pipeline` through every completion path.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::cast_possible_truncation
)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use sepiatone_io::{
    DELIVERY_THREAD_NAME, DecodedImage, FilterResult, FilterSpec, Pipeline, PipelineError,
    RuntimeConfig, TransferError, Url,
};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(10);

fn gradient_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x * 255 / width) as u8, (y * 255 / height) as u8, 180, 255])
    });
    let mut buf = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buf);
    image::ImageEncoder::write_image(
        encoder,
        img.as_raw(),
        img.width(),
        img.height(),
        image::ExtendedColorType::Rgba8,
    )
    .unwrap();
    buf
}

fn write_fixture(dir: &TempDir, name: &str, bytes: &[u8]) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    file_location(&path)
}

fn file_location(path: &Path) -> String {
    Url::from_file_path(path).unwrap().to_string()
}

fn pipeline() -> Pipeline {
    Pipeline::new(&RuntimeConfig::default()).unwrap()
}

/// Records how many times the completion ran, on which thread, and with what.
#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<(Option<String>, FilterResult)>>>,
}

impl Recorder {
    fn callback(&self) -> impl FnOnce(FilterResult) + Send + 'static {
        let calls = Arc::clone(&self.calls);
        let seen = Arc::clone(&self.seen);
        move |result| {
            calls.fetch_add(1, Ordering::SeqCst);
            let name = thread::current().name().map(str::to_owned);
            seen.lock().unwrap().push((name, result));
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn take(&self) -> Vec<(Option<String>, FilterResult)> {
        std::mem::take(&mut *self.seen.lock().unwrap())
    }
}

#[test]
fn invalid_location_completes_synchronously_without_background_work() {
    let pipeline = pipeline();
    let recorder = Recorder::default();
    let caller = thread::current().id();
    let ran_on = Arc::new(Mutex::new(None));

    let ran_on_in_callback = Arc::clone(&ran_on);
    let calls = Arc::clone(&recorder.calls);
    let handle = pipeline.apply_filter("not a url", FilterSpec::default(), move |result| {
        calls.fetch_add(1, Ordering::SeqCst);
        *ran_on_in_callback.lock().unwrap() = Some(thread::current().id());
        assert!(
            matches!(&result, Err(PipelineError::InvalidUrl(raw)) if raw == "not a url"),
            "got {result:?}",
        );
    });

    // Already complete when `apply_filter` returns.
    assert_eq!(recorder.calls(), 1);
    assert!(handle.is_finished());
    assert_eq!(*ran_on.lock().unwrap(), Some(caller));
    assert_eq!(pipeline.jobs_submitted(), 0);
}

#[test]
fn missing_file_is_transfer_failure() {
    let dir = TempDir::new().unwrap();
    let location = file_location(&dir.path().join("nonexistent.png"));

    let result = pipeline().submit(&location, FilterSpec::default()).wait();

    match result {
        Err(PipelineError::TransferFailure(TransferError::Io(io))) => {
            assert_eq!(io.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("expected TransferFailure, got {other:?}"),
    }
}

#[test]
fn nonexistent_root_file_is_transfer_failure() {
    let result = pipeline()
        .submit("file:///nonexistent.png", FilterSpec::default())
        .wait();
    assert!(
        matches!(result, Err(PipelineError::TransferFailure(_))),
        "got {result:?}",
    );
}

#[test]
fn non_image_file_is_invalid_data() {
    let dir = TempDir::new().unwrap();
    let location = write_fixture(&dir, "notes.txt", b"plain text, definitely not pixels\n");

    let result = pipeline().submit(&location, FilterSpec::default()).wait();
    assert!(
        matches!(result, Err(PipelineError::InvalidData(_))),
        "got {result:?}",
    );
}

#[test]
fn valid_png_is_delivered_filtered() {
    let dir = TempDir::new().unwrap();
    let png = gradient_png(24, 16);
    let location = write_fixture(&dir, "landscape.png", &png);

    let filtered = pipeline()
        .submit(&location, FilterSpec::default())
        .wait()
        .unwrap();

    let unfiltered = sepiatone_pipeline::decode_image(&png).unwrap();
    assert_eq!(filtered.dimensions(), unfiltered.dimensions());
    assert_ne!(filtered, unfiltered);
    assert_eq!(
        filtered,
        sepiatone_pipeline::process(&png, &FilterSpec::default()).unwrap()
    );
}

#[test]
fn filtered_image_reflects_intensity() {
    let dir = TempDir::new().unwrap();
    let png = gradient_png(8, 8);
    let location = write_fixture(&dir, "a.png", &png);
    let pipeline = pipeline();

    let identity = pipeline
        .submit(&location, FilterSpec::sepia(0.0))
        .wait()
        .unwrap();
    let half = pipeline
        .submit(&location, FilterSpec::sepia(0.5))
        .wait()
        .unwrap();

    assert_eq!(identity, sepiatone_pipeline::decode_image(&png).unwrap());
    assert_ne!(half, identity);
}

#[test]
fn invalid_filter_is_filter_failure_on_delivery_thread() {
    let dir = TempDir::new().unwrap();
    let location = write_fixture(&dir, "a.png", &gradient_png(4, 4));
    let recorder = Recorder::default();

    {
        let pipeline = pipeline();
        pipeline.apply_filter(&location, FilterSpec::sepia(3.0), recorder.callback());
    }

    let seen = recorder.take();
    assert_eq!(seen.len(), 1);
    let (thread_name, result) = &seen[0];
    assert_eq!(thread_name.as_deref(), Some(DELIVERY_THREAD_NAME));
    assert!(
        matches!(result, Err(PipelineError::FilterFailure(_))),
        "got {result:?}",
    );
}

#[test]
fn every_branch_completes_exactly_once_on_delivery_thread() {
    let dir = TempDir::new().unwrap();
    let good = write_fixture(&dir, "good.png", &gradient_png(10, 10));
    let text = write_fixture(&dir, "bad.png", b"GIF? no.");
    let missing = file_location(&dir.path().join("missing.png"));
    let recorder = Recorder::default();

    {
        let pipeline = pipeline();
        for location in [&good, &text, &missing] {
            pipeline.apply_filter(location, FilterSpec::default(), recorder.callback());
        }
        pipeline.apply_filter(&good, FilterSpec::sepia(-1.0), recorder.callback());
        // Dropping the pipeline waits for every queued invocation.
    }

    assert_eq!(recorder.calls(), 4);
    let seen = recorder.take();
    assert!(
        seen.iter()
            .all(|(name, _)| name.as_deref() == Some(DELIVERY_THREAD_NAME))
    );

    let ok = seen.iter().filter(|(_, r)| r.is_ok()).count();
    let invalid_data = seen
        .iter()
        .filter(|(_, r)| matches!(r, Err(PipelineError::InvalidData(_))))
        .count();
    let transfer = seen
        .iter()
        .filter(|(_, r)| matches!(r, Err(PipelineError::TransferFailure(_))))
        .count();
    let filter = seen
        .iter()
        .filter(|(_, r)| matches!(r, Err(PipelineError::FilterFailure(_))))
        .count();
    assert_eq!((ok, invalid_data, transfer, filter), (1, 1, 1, 1));
}

#[test]
fn concurrent_invocations_are_independent() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(&RuntimeConfig {
        background_workers: 4,
        ..RuntimeConfig::default()
    })
    .unwrap();

    let mut pending = Vec::new();
    for i in 0..24u32 {
        let location = if i % 3 == 0 {
            file_location(&dir.path().join(format!("missing-{i}.png")))
        } else {
            write_fixture(&dir, &format!("img-{i}.png"), &gradient_png(4 + i, 3 + i))
        };
        pending.push((i, pipeline.submit(&location, FilterSpec::default())));
    }

    for (i, pending) in pending {
        let result = pending.wait_timeout(WAIT).expect("result within timeout");
        if i % 3 == 0 {
            assert!(matches!(result, Err(PipelineError::TransferFailure(_))));
        } else {
            let image = result.unwrap();
            assert_eq!((image.width(), image.height()), (4 + i, 3 + i));
        }
    }
}

#[test]
fn cancelled_invocation_reports_cancelled() {
    let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(1);
    let png = gradient_png(6, 6);
    let pipeline = Pipeline::with_fetcher(&RuntimeConfig::default(), move |_: &Url| {
        let _ = gate_rx.recv_timeout(WAIT);
        Ok::<_, TransferError>(png.clone())
    })
    .unwrap();

    let pending = pipeline.submit("memory:slow.png", FilterSpec::default());
    pending.handle().cancel();
    gate_tx.send(()).unwrap();

    let result = pending.wait_timeout(WAIT).expect("result within timeout");
    assert!(matches!(result, Err(PipelineError::Cancelled)), "got {result:?}");
}

#[test]
fn cancel_after_completion_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let location = write_fixture(&dir, "a.png", &gradient_png(5, 5));
    let pipeline = pipeline();

    let pending = pipeline.submit(&location, FilterSpec::default());
    let handle = pending.handle().clone();
    let result = pending.wait();
    handle.cancel();

    assert!(result.is_ok());
    assert!(handle.is_finished());
}

#[test]
fn custom_fetcher_serves_in_memory_bytes() {
    let png = gradient_png(3, 2);
    let expected = sepiatone_pipeline::process(&png, &FilterSpec::default()).unwrap();
    let pipeline = Pipeline::with_fetcher(&RuntimeConfig::default(), move |url: &Url| {
        if url.scheme() == "memory" {
            Ok(png.clone())
        } else {
            Err(TransferError::UnsupportedScheme(url.scheme().to_owned()))
        }
    })
    .unwrap();

    let image: DecodedImage = pipeline
        .submit("memory:pixels", FilterSpec::default())
        .wait()
        .unwrap();
    assert_eq!(image, expected);

    let result = pipeline
        .submit("ftp://example.com/a.png", FilterSpec::default())
        .wait();
    assert!(matches!(
        result,
        Err(PipelineError::TransferFailure(TransferError::UnsupportedScheme(_)))
    ));
}

#[test]
fn default_fetcher_rejects_remote_schemes() {
    let result = pipeline()
        .submit("https://example.com/landscape.png", FilterSpec::default())
        .wait();
    assert!(matches!(
        result,
        Err(PipelineError::TransferFailure(TransferError::UnsupportedScheme(s))) if s == "https"
    ));
}

#[test]
fn byte_limit_applies_to_default_fetcher() {
    let dir = TempDir::new().unwrap();
    let location = write_fixture(&dir, "big.png", &gradient_png(32, 32));
    let pipeline = Pipeline::new(&RuntimeConfig {
        max_bytes: Some(8),
        ..RuntimeConfig::default()
    })
    .unwrap();

    let result = pipeline.submit(&location, FilterSpec::default()).wait();
    assert!(matches!(
        result,
        Err(PipelineError::TransferFailure(TransferError::TooLarge { limit: 8, .. }))
    ));
}

#[test]
fn panicking_fetcher_is_transfer_failure() {
    let recorder = Recorder::default();
    let handle = {
        let pipeline = Pipeline::with_fetcher(
            &RuntimeConfig::default(),
            |_: &Url| -> Result<Vec<u8>, TransferError> { panic!("fetcher exploded") },
        )
        .unwrap();
        pipeline.apply_filter("memory:x", FilterSpec::default(), recorder.callback())
    };

    assert_eq!(recorder.calls(), 1);
    assert!(handle.is_finished());
    let seen = recorder.take();
    assert!(
        matches!(
            &seen[0].1,
            Err(PipelineError::TransferFailure(TransferError::Panicked(msg)))
                if msg == "fetcher exploded"
        ),
        "got {:?}",
        seen[0].1,
    );
}

#[test]
fn completions_run_on_the_reported_delivery_thread() {
    let dir = TempDir::new().unwrap();
    let good = write_fixture(&dir, "good.png", &gradient_png(4, 4));
    let missing = file_location(&dir.path().join("missing.png"));
    let pipeline = pipeline();
    let (tx, rx) = crossbeam_channel::unbounded();

    let handles: Vec<_> = [&good, &missing, &good]
        .into_iter()
        .map(|location| {
            let tx = tx.clone();
            pipeline.apply_filter(location, FilterSpec::default(), move |_| {
                tx.send(thread::current().id()).unwrap();
            })
        })
        .collect();

    for _ in 0..handles.len() {
        let ran_on = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(ran_on, pipeline.delivery_thread_id());
    }
    assert_ne!(pipeline.delivery_thread_id(), thread::current().id());
}

#[test]
fn invocation_ids_are_unique_per_pipeline() {
    let pipeline = pipeline();
    let ids: Vec<u64> = (0..5)
        .map(|_| pipeline.apply_filter("not a url", FilterSpec::default(), |_| {}).id())
        .collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
}
