use criterion::{black_box, criterion_group, criterion_main, Criterion};
use grounded_inpaint::{BoundingBox, SegmentationMask};
use image::{DynamicImage, Rgb, RgbImage};

fn benchmark_mask_inversion(c: &mut Criterion) {
    let mask = SegmentationMask::new(vec![255; 1024 * 1024], (1024, 1024));

    c.bench_function("mask_invert_1024", |b| {
        b.iter(|| black_box(&mask).invert());
    });
}

fn benchmark_mask_overlay(c: &mut Criterion) {
    let base = DynamicImage::ImageRgb8(RgbImage::from_pixel(1024, 1024, Rgb([120, 90, 60])));
    let data: Vec<u8> = (0..1024u32 * 1024)
        .map(|i| if i % 3 == 0 { 255 } else { 0 })
        .collect();
    let mask = SegmentationMask::new(data, (1024, 1024));

    c.bench_function("mask_overlay_1024", |b| {
        b.iter(|| {
            black_box(&mask)
                .overlay(black_box(&base), grounded_inpaint::mask::DEFAULT_OVERLAY_COLOR)
                .unwrap()
        });
    });
}

fn benchmark_mask_resize(c: &mut Criterion) {
    let mask = SegmentationMask::new(vec![255; 1920 * 1080], (1920, 1080));

    c.bench_function("mask_resize_to_512", |b| {
        b.iter(|| black_box(&mask).resize(512, 512).unwrap());
    });
}

fn benchmark_box_conversion(c: &mut Criterion) {
    let boxes: Vec<BoundingBox> = (0..1000)
        .map(|i| {
            let f = i as f32 / 1000.0;
            BoundingBox::new(0.5, 0.5, 0.1 + f * 0.5, 0.1 + f * 0.5)
        })
        .collect();

    c.bench_function("box_round_trip_1000", |b| {
        b.iter(|| {
            for bbox in &boxes {
                let pixel = black_box(bbox).to_pixel(1920, 1080);
                black_box(pixel.to_normalized(1920, 1080));
            }
        });
    });
}

criterion_group!(
    mask_benches,
    benchmark_mask_inversion,
    benchmark_mask_overlay,
    benchmark_mask_resize,
    benchmark_box_conversion
);
criterion_main!(mask_benches);
