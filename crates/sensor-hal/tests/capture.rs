//! Snapshot pipeline against the simulated interface

mod common;

use common::{ready, ready_with, session};
use frame_pool::PoolConfig;
use sensor_hal::sim::{SimChip, SimMode};
use sensor_hal::{
    CaptureState, ConfigRequest, FitPolicy, FrameSize, PixFormat, Rotation, SensorError, SessionConfig,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

fn config(capacity_bytes: usize, buffers: usize) -> SessionConfig {
    SessionConfig {
        framebuffer: PoolConfig {
            capacity_bytes,
            buffers,
        },
        ..SessionConfig::simulation()
    }
}

#[tokio::test(start_paused = true)]
async fn test_rgb565_snapshot_undoes_sensor_byte_order() {
    let (mut session, _harness) = ready(SimChip::ov2640(), PixFormat::Rgb565, FrameSize::Qqvga);
    let frame = session.snapshot().await.unwrap();

    assert_eq!((frame.width, frame.height), (160, 120));
    assert_eq!(frame.data.len(), 160 * 120 * 2);
    assert_eq!(frame.sequence, 1);
    assert_eq!(session.capture_state(), CaptureState::Complete);

    // Red ramp peaks on the right edge; blue carries the frame counter
    let image = frame.to_rgb_image().unwrap();
    assert_eq!(image.get_pixel(0, 0).0, [0, 0, 16]);
    assert_eq!(image.get_pixel(159, 0).0, [255, 0, 16]);
}

#[tokio::test(start_paused = true)]
async fn test_grayscale_from_two_byte_stream() {
    let (mut session, _harness) = ready(SimChip::ov2640(), PixFormat::Grayscale, FrameSize::Qqvga);
    assert_eq!(session.src_bpp(), 2);
    let frame = session.snapshot().await.unwrap();
    assert_eq!(frame.data.len(), 160 * 120);
    // Chroma bytes never make it into the frame
    assert!(frame.data.iter().any(|&y| y != 0x80));
}

#[tokio::test(start_paused = true)]
async fn test_window_crops_lines() {
    let (mut session, _harness) = ready(SimChip::ov2640(), PixFormat::Rgb565, FrameSize::Qqvga);
    session.set_windowing(10, 20, 64, 48).unwrap();

    let frame = session.snapshot().await.unwrap();
    assert_eq!((frame.width, frame.height), (64, 48));
    assert_eq!(frame.data.len(), 64 * 48 * 2);
    let image = frame.to_rgb_image().unwrap();
    assert_eq!(image.get_pixel(0, 0).0, [16, 40, 16]);
}

#[tokio::test(start_paused = true)]
async fn test_jpeg_snapshot_decodes() {
    let (mut session, _harness) = ready(SimChip::ov2640(), PixFormat::Jpeg, FrameSize::Qqvga);
    let frame = session.snapshot().await.unwrap();
    assert_eq!(&frame.data[..2], &[0xFF, 0xD8]);
    let image = frame.to_rgb_image().unwrap();
    assert_eq!(image.dimensions(), (160, 120));
}

#[tokio::test(start_paused = true)]
async fn test_jpeg_larger_than_buffer_overflows() {
    // Planning assumes 400:1 compression; the real stream is far larger
    let config = SessionConfig {
        fit: FitPolicy {
            jpeg_compression: 400,
            ..FitPolicy::default()
        },
        ..config(512, 1)
    };
    let (mut session, _harness) = ready_with(SimChip::ov2640(), config, PixFormat::Jpeg, FrameSize::Qvga);
    assert_eq!(session.snapshot().await.unwrap_err(), SensorError::JpegOverflow);
    assert_eq!(session.capture_state(), CaptureState::Failed);
    assert_eq!(session.stats().failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_thermal_frames_read_by_driver() {
    let (mut session, harness) = ready(SimChip::lepton(), PixFormat::Grayscale, FrameSize::Qqvga);
    let frame = session.snapshot().await.unwrap();
    assert_eq!(frame.data.len(), 160 * 120);
    assert_eq!(frame.data[60 * 160], 200);
    assert_eq!(frame.data[0], 40);
    // Nothing streamed from the interface
    assert_eq!(harness.journal.position("start"), None);
}

#[tokio::test(start_paused = true)]
async fn test_framerate_throttle_drops_frames() {
    let (mut session, harness) = ready(SimChip::ov2640(), PixFormat::Grayscale, FrameSize::Qqqvga);
    harness.control.set_fps(30);
    session.set_framerate(10).unwrap();

    let frames = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&frames);
    session.set_frame_callback(Some(Box::new(move || {
        counter.fetch_add(1, Ordering::Relaxed);
    })));

    let first = session.snapshot().await.unwrap();
    drop(first);
    let second = session.snapshot().await.unwrap();

    assert_eq!(frames.load(Ordering::Relaxed), 2);
    assert_eq!(second.sequence, 2);
    assert!(session.stats().dropped >= 1);
    assert!(harness.control.frames_emitted() > 2);
}

#[tokio::test(start_paused = true)]
async fn test_driver_path_frames_throttled() {
    let (mut session, _harness) = ready(SimChip::lepton(), PixFormat::Grayscale, FrameSize::Qqvga);
    session.set_framerate(1).unwrap();

    let frames = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&frames);
    session.set_frame_callback(Some(Box::new(move || {
        counter.fetch_add(1, Ordering::Relaxed);
    })));

    let first = session.snapshot().await.unwrap();
    let first_ms = first.timestamp_ms;
    drop(first);
    let second = session.snapshot().await.unwrap();

    assert!(second.timestamp_ms - first_ms >= 1000);
    assert_eq!(session.stats().dropped, 1);
    assert_eq!(frames.load(Ordering::Relaxed), 2);
}

#[tokio::test(start_paused = true)]
async fn test_frame_callback_runs_while_streaming() {
    let (mut session, harness) = ready(SimChip::ov2640(), PixFormat::Grayscale, FrameSize::Qqqvga);
    harness.journal.clear();
    let journal = harness.journal.clone();
    let streaming = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&streaming);
    session.set_frame_callback(Some(Box::new(move || {
        let running = journal.position("start").is_some() && journal.position("stop").is_none();
        seen.store(running, Ordering::Relaxed);
    })));

    session.snapshot().await.unwrap();
    assert!(streaming.load(Ordering::Relaxed));
    assert!(harness.journal.position("stop").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_failed_capture_keeps_buffer_order() {
    let (mut session, harness) = ready_with(
        SimChip::ov2640(),
        config(64 * 1024, 2),
        PixFormat::Grayscale,
        FrameSize::Qqvga,
    );
    harness.control.set_mode(SimMode::Silent);
    assert_eq!(session.snapshot().await.unwrap_err(), SensorError::CaptureTimeout);

    harness.control.set_mode(SimMode::Normal);
    let first = session.snapshot().await.unwrap();
    let second = session.snapshot().await.unwrap();
    assert_eq!((first.slot(), second.slot()), (0, 1));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_then_recovery() {
    let (mut session, harness) = ready(SimChip::ov2640(), PixFormat::Grayscale, FrameSize::Qqvga);
    harness.control.set_mode(SimMode::Silent);

    assert_eq!(session.snapshot().await.unwrap_err(), SensorError::CaptureTimeout);
    assert_eq!(session.capture_state(), CaptureState::Failed);

    harness.control.set_mode(SimMode::Normal);
    let frame = session.snapshot().await.unwrap();
    assert_eq!(frame.data.len(), 160 * 120);
    assert_eq!(session.stats().failed, 1);
    assert_eq!(session.stats().captured, 1);
}

#[tokio::test(start_paused = true)]
async fn test_interface_fault_fails_capture() {
    let (mut session, harness) = ready(SimChip::ov2640(), PixFormat::Grayscale, FrameSize::Qqvga);
    harness.control.set_mode(SimMode::Fault);
    assert_eq!(session.snapshot().await.unwrap_err(), SensorError::CaptureFailed);
    assert_eq!(session.capture_state(), CaptureState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_abort_from_line_callback() {
    let (mut session, harness) = ready(SimChip::ov2640(), PixFormat::Grayscale, FrameSize::Qqvga);
    let abort = session.abort_handle();
    session.set_vsync_callback(Some(Box::new(move |line| {
        if line == 5 {
            abort.abort();
        }
    })));

    assert_eq!(session.snapshot().await.unwrap_err(), SensorError::CaptureFailed);
    assert_eq!(session.capture_state(), CaptureState::Aborted);
    assert_eq!(session.stats().aborted, 1);
    assert!(harness.journal.position("stop flush").is_some());

    session.set_vsync_callback(None);
    let frame = session.snapshot().await.unwrap();
    assert_eq!(frame.height, 120);
}

#[tokio::test(start_paused = true)]
async fn test_line_callback_sees_running_count() {
    let (mut session, _harness) = ready(SimChip::ov2640(), PixFormat::Grayscale, FrameSize::Qqqvga);
    let last = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&last);
    session.set_vsync_callback(Some(Box::new(move |line| {
        seen.store(line, Ordering::Relaxed);
    })));
    session.snapshot().await.unwrap();
    assert_eq!(last.load(Ordering::Relaxed), FrameSize::Qqqvga.resolution().1);
}

#[tokio::test(start_paused = true)]
async fn test_deferred_request_applied_after_frame() {
    let (mut session, _harness) = ready(SimChip::ov2640(), PixFormat::Grayscale, FrameSize::Qqvga);
    let handle = session.handle();
    let mut sent = false;
    session.set_vsync_callback(Some(Box::new(move |_| {
        if !sent {
            sent = handle.request(ConfigRequest::Framesize(FrameSize::Qqqvga)).is_ok();
        }
    })));

    let frame = session.snapshot().await.unwrap();
    assert_eq!((frame.width, frame.height), (160, 120));
    assert_eq!(session.framesize(), Some(FrameSize::Qqqvga));
}

#[tokio::test(start_paused = true)]
async fn test_held_frame_blocks_its_buffer() {
    let (mut session, _harness) = ready_with(
        SimChip::ov2640(),
        config(64 * 1024, 2),
        PixFormat::Grayscale,
        FrameSize::Qqvga,
    );
    let first = session.snapshot().await.unwrap();
    let second = session.snapshot().await.unwrap();
    assert_ne!(first.slot(), second.slot());

    assert_eq!(session.snapshot().await.unwrap_err(), SensorError::FramebufferError);
    assert_eq!(session.capture_state(), CaptureState::Idle);

    drop(first);
    let third = session.snapshot().await.unwrap();
    assert_eq!(third.slot(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_transpose_swaps_dimensions() {
    let (mut session, _harness) = ready(SimChip::ov2640(), PixFormat::Grayscale, FrameSize::Qqvga);
    session.set_transpose(true).unwrap();
    let frame = session.snapshot().await.unwrap();
    assert_eq!((frame.width, frame.height), (120, 160));
}

#[tokio::test(start_paused = true)]
async fn test_auto_rotation_follows_device() {
    let (mut session, _harness) = ready(SimChip::ov2640(), PixFormat::Grayscale, FrameSize::Qqvga);
    session.set_auto_rotation(true).unwrap();

    session.set_device_rotation(Rotation::Deg90);
    let frame = session.snapshot().await.unwrap();
    assert_eq!((frame.width, frame.height), (120, 160));
    drop(frame);

    // Explicit transpose cancels the quarter turn's transpose
    session.set_transpose(true).unwrap();
    let frame = session.snapshot().await.unwrap();
    assert_eq!((frame.width, frame.height), (160, 120));
}

#[tokio::test(start_paused = true)]
async fn test_frames_share_the_session_palette() {
    let (mut session, _harness) = ready(SimChip::ov2640(), PixFormat::Grayscale, FrameSize::Qqqvga);
    let frame = session.snapshot().await.unwrap();
    let palette = session.color_palette().unwrap();
    assert!(Arc::ptr_eq(frame.palette.as_ref().unwrap(), palette));
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_preconditions() {
    let (mut session, _harness) = session(SimChip::ov2640());
    assert_eq!(session.snapshot().await.unwrap_err(), SensorError::IscUndetected);

    session.init().unwrap();
    assert_eq!(session.snapshot().await.unwrap_err(), SensorError::InvalidPixformat);
    session.set_pixformat(PixFormat::Grayscale).unwrap();
    assert_eq!(session.snapshot().await.unwrap_err(), SensorError::InvalidFramesize);
}
