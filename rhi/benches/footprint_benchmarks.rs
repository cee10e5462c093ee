use criterion::{Criterion, black_box, criterion_group, criterion_main};

use redlilium_rhi::footprint::{self, FootprintRules};
use redlilium_rhi::{
    ExecutionMode, LockMode, PixelFormat, RhiConfig, RhiDevice, SourceLayout, TextureDescriptor,
    UpdateTextureRegion,
};

// ---------------------------------------------------------------------------
// Layout math
// ---------------------------------------------------------------------------

fn bench_subresource_footprint(c: &mut Criterion) {
    let desc = TextureDescriptor::new_2d(4096, 4096, PixelFormat::Bc7RgbaUnorm).with_mip_levels(13);
    let rules = FootprintRules::default();
    c.bench_function("subresource_footprint_bc7_all_mips", |b| {
        b.iter(|| {
            for subresource in 0..13 {
                black_box(
                    footprint::subresource_footprint(black_box(&desc), subresource, rules).ok(),
                );
            }
        });
    });
}

fn bench_packed_layout(c: &mut Criterion) {
    let desc = TextureDescriptor::new_cube(1024, PixelFormat::Rgba16Float)
        .with_mip_levels(11)
        .with_array_size(4);
    let count = desc.subresource_count();
    let rules = FootprintRules::default();
    c.bench_function("packed_layout_cube_array", |b| {
        b.iter(|| black_box(footprint::packed_layout(black_box(&desc), 0, count, 0, rules).ok()));
    });
}

fn bench_tightly_packed_size(c: &mut Criterion) {
    let desc = TextureDescriptor::new_3d(256, 256, 256, PixelFormat::R32Float).with_mip_levels(9);
    c.bench_function("tightly_packed_size_volume", |b| {
        b.iter(|| black_box(footprint::tightly_packed_size(black_box(&desc))));
    });
}

// ---------------------------------------------------------------------------
// Software device
// ---------------------------------------------------------------------------

fn bench_lock_unlock(c: &mut Criterion) {
    let device = RhiDevice::new(RhiConfig::default().with_execution_mode(ExecutionMode::Immediate))
        .expect("Failed to create device");
    let texture = device
        .create_texture(
            &TextureDescriptor::new_2d(256, 256, PixelFormat::Rgba8Unorm),
            None,
            "bench",
        )
        .expect("Failed to create texture");
    let data = vec![0x5Au8; 256 * 256 * 4];

    c.bench_function("write_lock_unlock_256", |b| {
        b.iter(|| {
            let locked = texture
                .lock(0, LockMode::WriteOnly)
                .expect("Failed to lock");
            locked.write_packed(&data).expect("Failed to write");
            texture.unlock(0).expect("Failed to unlock");
            device.end_frame().expect("Failed to end frame");
        });
    });
}

fn bench_update_region(c: &mut Criterion) {
    let device = RhiDevice::new(RhiConfig::default()).expect("Failed to create device");
    let texture = device
        .create_texture(
            &TextureDescriptor::new_2d(1024, 1024, PixelFormat::Rgba8Unorm),
            None,
            "bench",
        )
        .expect("Failed to create texture");
    let data = vec![0xA5u8; 64 * 64 * 4];
    let region = UpdateTextureRegion::new_2d(0, 128, 128, 64, 64);

    c.bench_function("update_region_64x64", |b| {
        b.iter(|| {
            texture
                .update_region(&region, SourceLayout::new(64 * 4, 64), black_box(&data))
                .expect("Failed to update");
            device.end_frame().expect("Failed to end frame");
        });
    });
}

criterion_group!(
    footprint_benches,
    bench_subresource_footprint,
    bench_packed_layout,
    bench_tightly_packed_size,
);

criterion_group!(device_benches, bench_lock_unlock, bench_update_region);

criterion_main!(footprint_benches, device_benches);
