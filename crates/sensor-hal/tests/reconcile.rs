//! Configuration reconciliation through a simulated session

mod common;

use common::{ready, ready_with, session, session_with};
use frame_pool::PoolConfig;
use sensor_hal::ioctl::decode;
use sensor_hal::sim::SimChip;
use sensor_hal::{
    ConfigRequest, FrameSize, GainCeiling, IoctlArg, IoctlCode, IoctlRequest, IoctlResponse, PixFormat,
    RgbGains, SensorError, SessionConfig, Window,
};
use std::sync::Arc;

fn with_memory(capacity_bytes: usize) -> SessionConfig {
    SessionConfig {
        framebuffer: PoolConfig {
            capacity_bytes,
            buffers: 1,
        },
        ..SessionConfig::simulation()
    }
}

#[test]
fn test_framesize_resets_window_to_full_frame() {
    let (mut session, harness) = ready(SimChip::ov2640(), PixFormat::Rgb565, FrameSize::Qvga);
    assert_eq!(session.window(), Window::new(0, 0, 320, 240));
    assert!(!session.is_cropped());
    assert_eq!((session.src_bpp(), session.dst_bpp()), (2, 2));

    let entries = harness.journal.entries();
    assert_eq!(entries.last().map(String::as_str), Some("reconfigure FRAMESIZE|PIXFORMAT"));
    assert!(session.record().generation >= 3);
}

#[test]
fn test_five_megapixel_degrades_into_one_megabyte() {
    let (mut session, _harness) = session(SimChip::ov5640());
    session.init().unwrap();
    session.set_pixformat(PixFormat::Rgb565).unwrap();
    session.set_framesize(FrameSize::Wqxga2).unwrap();

    assert_eq!(session.pixformat(), Some(PixFormat::Rgb565));
    assert_eq!(session.framesize(), Some(FrameSize::Fhd));
    assert_eq!(session.window(), Window::new(480, 270, 960, 540));
    assert!(session.check_framebuffer_size());
}

#[test]
fn test_oversized_framesize_falls_back_to_smaller_size() {
    // Room for QQVGA grayscale and no window cropping allowed
    let config = SessionConfig {
        fit: sensor_hal::FitPolicy {
            max_crop_divisor: 1,
            allow_format_fallback: false,
            ..Default::default()
        },
        ..with_memory(160 * 120)
    };
    let (mut session, _harness) = ready_with(SimChip::hm01b0(), config, PixFormat::Grayscale, FrameSize::Qqvga);

    session.set_framesize(FrameSize::R320x320).unwrap();
    let framesize = session.framesize().unwrap();
    assert_ne!(framesize, FrameSize::R320x320);
    assert_eq!(session.window(), Window::full(framesize));
    assert!(session.check_framebuffer_size());
}

#[test]
fn test_overflow_without_fallback_is_reported() {
    let config = SessionConfig {
        fit: sensor_hal::FitPolicy {
            max_crop_divisor: 1,
            allow_format_fallback: false,
            ..Default::default()
        },
        ..with_memory(64)
    };
    let (mut session, _harness) = session_with(SimChip::ov2640(), config);
    session.init().unwrap();
    session.set_pixformat(PixFormat::Rgb565).unwrap();

    assert_eq!(session.set_framesize(FrameSize::Qvga), Err(SensorError::FramebufferOverflow));
    assert_eq!(session.framesize(), None);
    assert_eq!(session.pixformat(), Some(PixFormat::Rgb565));
}

#[test]
fn test_rejected_reconfiguration_restores_previous_geometry() {
    let (mut session, harness) = ready(SimChip::ov2640(), PixFormat::Rgb565, FrameSize::Qvga);
    let generation = session.record().generation;
    harness.control.fail_reconfigure(true);

    assert_eq!(session.set_framesize(FrameSize::Qqvga), Err(SensorError::CsiInitFailed));
    assert_eq!(session.framesize(), Some(FrameSize::Qvga));
    assert_eq!(session.window(), Window::full(FrameSize::Qvga));
    // Frame size register back on QVGA
    assert_eq!(session.read_reg(0x13).unwrap(), 9);

    assert_eq!(session.set_pixformat(PixFormat::Grayscale), Err(SensorError::CsiInitFailed));
    assert_eq!(session.pixformat(), Some(PixFormat::Rgb565));
    assert_eq!(session.read_reg(0x12).unwrap(), 1);

    assert_eq!(session.set_windowing(0, 0, 160, 120), Err(SensorError::CsiInitFailed));
    assert!(!session.is_cropped());
    assert_eq!(session.record().generation, generation);

    harness.control.fail_reconfigure(false);
    session.set_framesize(FrameSize::Qqvga).unwrap();
    assert_eq!(session.read_reg(0x13).unwrap(), 8);
}

#[test]
fn test_jpeg_framesize_bounded_by_worst_case_size() {
    let (mut session, _harness) = session_with(SimChip::ov2640(), with_memory(64));
    session.init().unwrap();
    session.set_pixformat(PixFormat::Jpeg).unwrap();
    assert_eq!(session.set_framesize(FrameSize::Uxga), Err(SensorError::FramebufferOverflow));
    assert_eq!(session.framesize(), None);

    // 1 MiB holds a worst-case FHD stream and nothing larger
    let (mut session, _harness) = common::session(SimChip::ov5640());
    session.init().unwrap();
    session.set_pixformat(PixFormat::Jpeg).unwrap();
    session.set_framesize(FrameSize::Wqxga2).unwrap();
    assert_eq!(session.framesize(), Some(FrameSize::Fhd));
    assert_eq!(session.window(), Window::full(FrameSize::Fhd));
    assert!(session.check_framebuffer_size());
}

#[test]
fn test_unsupported_control_leaves_state_unchanged() {
    let (mut session, _harness) = ready(SimChip::lepton(), PixFormat::Grayscale, FrameSize::Qqvga);
    assert_eq!(session.set_hmirror(true), Err(SensorError::CtlUnsupported));
    assert!(!session.hmirror());
    assert_eq!(session.set_gainceiling(GainCeiling::X8), Err(SensorError::CtlUnsupported));
    assert_eq!(session.gainceiling(), None);
}

#[test]
fn test_unsupported_format_and_size_rejected() {
    let (mut session, _harness) = ready(SimChip::lepton(), PixFormat::Grayscale, FrameSize::Qqvga);
    assert_eq!(session.set_pixformat(PixFormat::Rgb565), Err(SensorError::InvalidPixformat));
    assert_eq!(session.set_framesize(FrameSize::Vga), Err(SensorError::InvalidFramesize));
    assert_eq!(session.framesize(), Some(FrameSize::Qqvga));
}

#[test]
fn test_mirror_and_flip_program_the_sensor() {
    let (mut session, _harness) = ready(SimChip::ov2640(), PixFormat::Rgb565, FrameSize::Qvga);
    session.set_hmirror(true).unwrap();
    session.set_vflip(true).unwrap();
    assert!(session.hmirror() && session.vflip());
    // Mirror control register carries both bits
    assert_eq!(session.read_reg(0x40).unwrap(), 0x03);
}

#[test]
fn test_jpeg_refused_while_cropped_or_transposed() {
    let (mut session, _harness) = ready(SimChip::ov2640(), PixFormat::Rgb565, FrameSize::Qvga);
    session.set_windowing(0, 0, 160, 120).unwrap();
    assert_eq!(session.set_pixformat(PixFormat::Jpeg), Err(SensorError::PixformatUnsupported));

    session.set_framesize(FrameSize::Qqvga).unwrap();
    session.set_transpose(true).unwrap();
    assert_eq!(session.set_pixformat(PixFormat::Jpeg), Err(SensorError::PixformatUnsupported));

    session.set_transpose(false).unwrap();
    session.set_pixformat(PixFormat::Jpeg).unwrap();
    assert_eq!(session.set_transpose(true), Err(SensorError::PixformatUnsupported));
    assert_eq!(session.set_auto_rotation(true), Err(SensorError::PixformatUnsupported));
    assert_eq!(
        session.set_windowing(0, 0, 80, 60),
        Err(SensorError::PixformatUnsupported)
    );
}

#[test]
fn test_jpeg_unavailable_on_sensor_without_encoder() {
    let (mut session, _harness) = session(SimChip::at(0x42, 0x0A, 0x77));
    session.init().unwrap();
    assert_eq!(session.set_pixformat(PixFormat::Jpeg), Err(SensorError::InvalidPixformat));
}

#[test]
fn test_windowing_checks() {
    let (mut session, _harness) = session(SimChip::ov2640());
    session.init().unwrap();
    assert_eq!(session.set_windowing(0, 0, 10, 10), Err(SensorError::InvalidFramesize));

    session.set_pixformat(PixFormat::Rgb565).unwrap();
    session.set_framesize(FrameSize::Qvga).unwrap();
    assert_eq!(session.set_windowing(300, 0, 40, 10), Err(SensorError::InvalidWindow));
    assert_eq!(session.set_windowing(0, 0, 0, 10), Err(SensorError::InvalidWindow));

    session.set_windowing(40, 30, 240, 180).unwrap();
    assert!(session.is_cropped());
    assert_eq!(session.window(), Window::new(40, 30, 240, 180));
}

#[test]
fn test_window_larger_than_memory_rejected() {
    let (mut session, _harness) = ready_with(
        SimChip::ov2640(),
        with_memory(320 * 240),
        PixFormat::Grayscale,
        FrameSize::Qvga,
    );
    session.set_framesize(FrameSize::Vga).unwrap();
    let window = session.window();
    assert!(window.area() <= 320 * 240);
    assert_eq!(
        session.set_windowing(0, 0, 640, 480),
        Err(SensorError::FramebufferOverflow)
    );
    assert_eq!(session.window(), window);
}

#[test]
fn test_bayer_kept_when_color_would_not_fit() {
    let (mut session, _harness) = ready_with(
        SimChip::ov2640(),
        with_memory(100_000),
        PixFormat::Bayer,
        FrameSize::Qvga,
    );
    session.set_pixformat(PixFormat::Rgb565).unwrap();
    assert_eq!(session.pixformat(), Some(PixFormat::Bayer));

    // Grayscale is not a color format and switches normally
    session.set_pixformat(PixFormat::Grayscale).unwrap();
    assert_eq!(session.pixformat(), Some(PixFormat::Grayscale));
}

#[test]
fn test_framerate_limits_and_software_fallback() {
    let (mut session, _harness) = ready(SimChip::ov2640(), PixFormat::Rgb565, FrameSize::Qvga);
    assert_eq!(session.set_framerate(1001), Err(SensorError::InvalidFramerate));
    session.set_framerate(15).unwrap();
    assert_eq!(session.framerate(), 15);

    // No rate control on the thermal core
    let (mut thermal, _harness) = ready(SimChip::lepton(), PixFormat::Grayscale, FrameSize::Qqvga);
    thermal.set_framerate(9).unwrap();
    assert_eq!(thermal.framerate(), 9);
}

#[test]
fn test_level_controls() {
    let (mut session, _harness) = ready(SimChip::ov2640(), PixFormat::Rgb565, FrameSize::Qvga);
    assert_eq!(session.set_contrast(4), Err(SensorError::InvalidArgument));
    assert_eq!(session.set_brightness(-4), Err(SensorError::InvalidArgument));
    session.set_contrast(-3).unwrap();
    session.set_saturation(3).unwrap();
    assert_eq!(session.set_quality(101), Err(SensorError::InvalidArgument));
    session.set_quality(90).unwrap();
    session.set_colorbar(true).unwrap();
}

#[test]
fn test_gain_exposure_and_white_balance() {
    let (mut session, _harness) = ready(SimChip::ov2640(), PixFormat::Rgb565, FrameSize::Qvga);
    assert_eq!(
        session.set_auto_gain(false, Some(f32::NAN), None),
        Err(SensorError::InvalidArgument)
    );
    session.set_auto_gain(false, Some(12.5), Some(24.0)).unwrap();
    assert_eq!(session.gain_db().unwrap(), 12.5);

    session.set_auto_exposure(false, Some(20_000)).unwrap();
    assert_eq!(session.exposure_us().unwrap(), 20_000);

    let gains = RgbGains {
        r_db: 1.5,
        g_db: 0.0,
        b_db: 2.0,
    };
    session.set_auto_whitebal(false, Some(gains)).unwrap();
    assert_eq!(session.rgb_gain_db().unwrap(), gains);
}

#[test]
fn test_black_level_calibration_round_trip() {
    let (mut session, _harness) = ready(SimChip::ov5640(), PixFormat::Rgb565, FrameSize::Qvga);
    assert_eq!(session.flags().blc_size, 8);
    assert_eq!(
        session.set_auto_blc(false, Some(&[1, 2, 3])),
        Err(SensorError::InvalidArgument)
    );
    let regs = [10, 11, 12, 13, 14, 15, 16, 17];
    session.set_auto_blc(false, Some(&regs)).unwrap();
    assert_eq!(session.blc_regs().unwrap(), regs.to_vec());
}

#[test]
fn test_reset_restores_defaults() {
    let (mut session, harness) = ready(SimChip::ov2640(), PixFormat::Rgb565, FrameSize::Qvga);
    session.set_hmirror(true).unwrap();
    session.set_framerate(10).unwrap();
    harness.journal.clear();

    session.reset().unwrap();
    assert_eq!(session.pixformat(), None);
    assert_eq!(session.framesize(), None);
    assert_eq!(session.framerate(), 0);
    assert!(!session.hmirror());
    assert!(session.is_detected());
    assert_eq!(harness.journal.entries(), vec!["reconfigure INIT"]);
    // Both lines released after the reset pulse
    assert_eq!(harness.rig.lines(), (false, false));
}

#[test]
fn test_shutdown_and_sleep() {
    let (mut session, harness) = ready(SimChip::ov2640(), PixFormat::Rgb565, FrameSize::Qvga);
    session.shutdown(true).unwrap();
    assert!(harness.rig.lines().1);

    harness.journal.clear();
    session.shutdown(false).unwrap();
    assert!(!harness.rig.lines().1);
    assert_eq!(harness.journal.entries(), vec!["reconfigure INIT"]);

    session.sleep(true).unwrap();
    assert_eq!(session.read_reg(0x09).unwrap(), 1);
}

#[test]
fn test_framebuffer_count_refits_geometry() {
    let (mut session, _harness) = ready(SimChip::ov2640(), PixFormat::Rgb565, FrameSize::Vga);
    assert_eq!(session.window(), Window::new(0, 0, 640, 480));

    // Four buffers of 256 KiB cannot hold 600 KiB
    session.set_framebuffers(4).unwrap();
    assert_eq!(session.framebuffers(), 4);
    assert!(session.check_framebuffer_size());
    assert!(session.window().area() * 2 <= 256 * 1024);

    assert_eq!(session.set_framebuffers(0), Err(SensorError::InvalidArgument));
    assert_eq!(session.framebuffers(), 4);
}

#[test]
fn test_deferred_requests_applied_on_demand() {
    let (mut session, _harness) = ready(SimChip::ov2640(), PixFormat::Rgb565, FrameSize::Qvga);
    let handle = session.handle();
    handle.request(ConfigRequest::Framesize(FrameSize::Qqvga)).unwrap();
    handle.request(ConfigRequest::Framerate(5000)).unwrap();

    assert_eq!(session.framesize(), Some(FrameSize::Qvga));
    assert_eq!(session.apply_deferred(), 2);
    assert_eq!(session.framesize(), Some(FrameSize::Qqvga));

    let errors = session.take_deferred_errors();
    assert_eq!(errors, vec![(ConfigRequest::Framerate(5000), SensorError::InvalidFramerate)]);
    assert!(session.take_deferred_errors().is_empty());
}

#[test]
fn test_color_palette_length_checked() {
    let (mut session, _harness) = session(SimChip::ov2640());
    let short: Arc<[u16]> = vec![0u16; 16].into();
    assert_eq!(session.set_color_palette(Some(short)), Err(SensorError::InvalidArgument));
    assert_eq!(session.color_palette().map(|p| p.len()), Some(256));

    session.set_color_palette(None).unwrap();
    assert!(session.color_palette().is_none());
}

#[test]
fn test_vendor_requests() {
    let (mut session, _harness) = ready(SimChip::ov5640(), PixFormat::Rgb565, FrameSize::Qvga);
    session
        .ioctl(&IoctlRequest::SetReadoutWindow {
            x: 16,
            y: 8,
            w: 1280,
            h: 720,
        })
        .unwrap();
    assert_eq!(
        session.ioctl(&IoctlRequest::GetReadoutWindow).unwrap(),
        IoctlResponse::Window {
            x: 16,
            y: 8,
            w: 1280,
            h: 720
        }
    );
    assert_eq!(session.ioctl(&IoctlRequest::TriggerAutoFocus), Ok(IoctlResponse::Done));
    assert_eq!(
        session.ioctl(&IoctlRequest::LeptonGetWidth),
        Err(SensorError::CtlUnsupported)
    );

    let raw = IoctlCode::SetNightMode.raw();
    session.ioctl_raw(raw, &[IoctlArg::Int(1)]).unwrap();
    assert_eq!(session.ioctl(&IoctlRequest::GetNightMode), Ok(IoctlResponse::Flag(true)));

    assert_eq!(session.ioctl_raw(0x7F, &[]), Err(SensorError::CtlUnsupported));
    assert_eq!(session.ioctl_raw(raw, &[]), Err(SensorError::CtlFailed));
}

#[test]
fn test_thermal_vendor_requests() {
    let (mut session, _harness) = ready(SimChip::lepton(), PixFormat::Grayscale, FrameSize::Qqvga);
    assert_eq!(session.ioctl(&IoctlRequest::LeptonGetWidth), Ok(IoctlResponse::Value(160)));

    let request = decode(
        IoctlCode::LeptonSetMeasurementRange.raw(),
        &[IoctlArg::Float(-10.0), IoctlArg::Float(400.0)],
    )
    .unwrap();
    session.ioctl(&request).unwrap();
    assert_eq!(
        session.ioctl(&IoctlRequest::LeptonGetMeasurementRange),
        Ok(IoctlResponse::Range {
            min_c: -10.0,
            max_c: 400.0
        })
    );

    session
        .ioctl(&IoctlRequest::LeptonSetAttribute {
            command: 0x4E2C,
            data: vec![1, 2],
        })
        .unwrap();
    assert_eq!(
        session.ioctl(&IoctlRequest::LeptonGetAttribute {
            command: 0x4E2C,
            words: 3
        }),
        Ok(IoctlResponse::Words(vec![1, 2, 0]))
    );
}

#[test]
fn test_motion_detection_requests() {
    let (mut session, _harness) = ready(SimChip::hm01b0(), PixFormat::Grayscale, FrameSize::Qvga);
    session.ioctl(&IoctlRequest::HimaxMdThreshold(10)).unwrap();
    session
        .ioctl(&IoctlRequest::HimaxMdWindow {
            x1: 0,
            y1: 0,
            x2: 160,
            y2: 120,
        })
        .unwrap();
    session.ioctl(&IoctlRequest::HimaxMdEnable(true)).unwrap();
    assert_eq!(session.read_reg(0x61).unwrap(), 10);
    assert_eq!(session.read_reg(0x60).unwrap() & 0x01, 1);
}
