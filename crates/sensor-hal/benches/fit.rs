use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sensor_hal::fit::{plan, shrink_window};
use sensor_hal::frame::orient;
use sensor_hal::types::Orientation;
use sensor_hal::{FitPolicy, FrameSize, Geometry, PixFormat, Rotation, Window};

const MB: u64 = 1024 * 1024;

fn bench_plan(c: &mut Criterion) {
    let policy = FitPolicy::default();
    let five_mp = Geometry::full(PixFormat::Rgb565, FrameSize::Wqxga2);
    let cropped = Geometry {
        window: Window::new(100, 100, 1200, 900),
        ..five_mp
    };

    let mut group = c.benchmark_group("fit_plan");
    group.bench_function("5mp_rgb565_into_1mb", |b| {
        b.iter(|| plan(black_box(&five_mp), black_box(MB), |_| true, |_| true, &policy))
    });
    group.bench_function("5mp_rgb565_into_64k", |b| {
        b.iter(|| plan(black_box(&five_mp), black_box(64 * 1024), |_| true, |_| true, &policy))
    });
    group.bench_function("cropped_into_1mb", |b| {
        b.iter(|| plan(black_box(&cropped), black_box(MB), |_| true, |_| true, &policy))
    });
    group.finish();

    c.bench_function("shrink_window_uxga", |b| {
        let window = Window::full(FrameSize::Uxga);
        b.iter(|| shrink_window(black_box(&window), PixFormat::Rgb565, MB, &policy))
    });
}

fn bench_orient(c: &mut Criterion) {
    let (w, h) = FrameSize::Vga.resolution();
    let frame: Vec<u8> = (0..w * h * 2).map(|i| i as u8).collect();
    let quarter_turn = Orientation::from_rotation(Rotation::Deg90);

    c.bench_function("orient_vga_rgb565_deg90", |b| {
        b.iter(|| orient(black_box(frame.clone()), w, h, 2, quarter_turn))
    });
}

criterion_group!(benches, bench_plan, bench_orient);
criterion_main!(benches);
