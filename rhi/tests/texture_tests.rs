//! Integration tests for the texture engine.
//!
//! Tests are parameterized using `rstest` to run in both execution modes
//! where the mode can change the outcome.
//!
//! # Test Categories
//!
//! - **Lock Tests**: write/read round trips, double locks, dynamic reuse
//! - **Update Tests**: region updates, ordering, end-to-end readback
//! - **Copy Tests**: region copies, readback textures, validation
//! - **Lifetime Tests**: aliasing, reallocation, multi-node peers, failures

mod common;

use rstest::rstest;

use common::{TestContext, generate_test_pattern, get_pixel};
use redlilium_rhi::{
    CopyTextureInfo, CopyTextureOptions, ExecutionMode, Extent3d, HeapType, LockMode, Origin3d,
    PixelFormat, ReallocationStatus, ResourceState, RhiConfig, RhiError, SourceLayout,
    TextureDescriptor, TextureFlags, UpdateTextureRegion,
};

// ============================================================================
// Lock Tests
// ============================================================================

/// Writing through a write lock and reading through a read lock yields the
/// same bytes.
#[rstest]
#[case::r8_1x1(TextureDescriptor::new_2d(1, 1, PixelFormat::R8Unorm))]
#[case::bc1_256(TextureDescriptor::new_2d(256, 256, PixelFormat::Bc1RgbaUnorm))]
#[case::r32f_volume(TextureDescriptor::new_3d(16, 16, 16, PixelFormat::R32Float))]
fn test_lock_roundtrip(
    #[case] desc: TextureDescriptor,
    #[values(ExecutionMode::Immediate, ExecutionMode::Threaded)] mode: ExecutionMode,
) {
    let ctx = TestContext::new(mode);
    let texture = ctx.create(&desc);

    let locked = texture.lock(0, LockMode::WriteOnly).unwrap();
    assert_eq!(locked.row_pitch() % 256, 0);
    let fp = *locked.footprint();
    let packed_len = (fp.row_size_bytes * fp.row_count * fp.depth) as usize;
    let pattern = generate_test_pattern(packed_len, 7);
    locked.write_packed(&pattern).unwrap();
    texture.unlock(0).unwrap();

    assert_eq!(ctx.read_subresource(&texture, 0), pattern);
}

#[test]
fn test_volume_roundtrip_with_floats() {
    let ctx = TestContext::new(ExecutionMode::Immediate);
    let texture = ctx.create(&TextureDescriptor::new_3d(16, 16, 16, PixelFormat::R32Float));

    let values: Vec<f32> = (0..16 * 16 * 16).map(|i| i as f32 * 0.5).collect();
    ctx.write_subresource(&texture, 0, bytemuck::cast_slice(&values));

    let read = ctx.read_subresource(&texture, 0);
    let read: &[f32] = bytemuck::cast_slice(&read);
    assert_eq!(read, values.as_slice());
}

#[test]
fn test_double_lock_is_rejected() {
    let ctx = TestContext::new(ExecutionMode::Immediate);
    let texture = ctx.create_texture_2d(8, 8, PixelFormat::Rgba8Unorm);

    let first = texture.lock(0, LockMode::WriteOnly).unwrap();
    let pattern = generate_test_pattern(8 * 8 * 4, 3);
    first.write_packed(&pattern).unwrap();

    assert!(matches!(
        texture.lock(0, LockMode::WriteOnly),
        Err(RhiError::InvalidState(_))
    ));
    assert!(matches!(
        texture.lock(0, LockMode::ReadOnly),
        Err(RhiError::InvalidState(_))
    ));

    // The first lock is untouched.
    assert_eq!(first.read_packed(), pattern);
    texture.unlock(0).unwrap();
    assert_eq!(ctx.read_subresource(&texture, 0), pattern);
}

#[test]
fn test_unlock_without_lock_is_rejected() {
    let ctx = TestContext::new(ExecutionMode::Immediate);
    let texture = ctx.create_texture_2d(8, 8, PixelFormat::Rgba8Unorm);
    assert!(matches!(texture.unlock(0), Err(RhiError::InvalidState(_))));
    assert!(matches!(
        texture.lock(1, LockMode::WriteOnly),
        Err(RhiError::InvalidParameter(_))
    ));
}

#[test]
fn test_multisampled_textures_cannot_be_locked() {
    let ctx = TestContext::new(ExecutionMode::Immediate);
    let desc = TextureDescriptor::new_2d(16, 16, PixelFormat::Rgba8Unorm)
        .with_sample_count(4)
        .with_flags(TextureFlags::RENDER_TARGET)
        .with_initial_state(ResourceState::RenderTarget);
    let texture = ctx.create(&desc);
    assert!(matches!(
        texture.lock(0, LockMode::ReadOnly),
        Err(RhiError::InvalidState(_))
    ));
}

/// A dynamic texture written every frame keeps reusing one staging buffer,
/// waiting for the GPU instead of allocating another.
#[rstest]
#[case::immediate(ExecutionMode::Immediate)]
#[case::threaded(ExecutionMode::Threaded)]
fn test_dynamic_lock_reuses_staging(#[case] mode: ExecutionMode) {
    let ctx = TestContext::new(mode);
    let desc = TextureDescriptor::new_2d(64, 64, PixelFormat::Rgba8Unorm)
        .with_flags(TextureFlags::SHADER_RESOURCE | TextureFlags::DYNAMIC);
    let texture = ctx.create(&desc);
    let upload = || ctx.device.allocator().live_bytes(HeapType::Upload);

    ctx.write_subresource(&texture, 0, &generate_test_pattern(64 * 64 * 4, 1));
    let first = upload();
    assert!(first > 0);

    // Twice within one frame: the second lock waits on the first upload.
    ctx.write_subresource(&texture, 0, &generate_test_pattern(64 * 64 * 4, 2));
    assert_eq!(upload(), first);

    for seed in 3..11 {
        ctx.device.end_frame().unwrap();
        ctx.write_subresource(&texture, 0, &generate_test_pattern(64 * 64 * 4, seed));
        assert_eq!(upload(), first, "frame with seed {seed}");
    }

    assert_eq!(
        ctx.read_subresource(&texture, 0),
        generate_test_pattern(64 * 64 * 4, 10)
    );
}

#[test]
fn test_static_lock_staging_is_released_after_retirement() {
    let ctx = TestContext::new(ExecutionMode::Immediate);
    let texture = ctx.create_texture_2d(64, 64, PixelFormat::Rgba8Unorm);

    ctx.write_subresource(&texture, 0, &generate_test_pattern(64 * 64 * 4, 1));
    assert!(ctx.device.allocator().live_bytes(HeapType::Upload) > 0);
    assert_eq!(ctx.device.pending_release_count(), 1);

    ctx.device.flush().unwrap();
    assert_eq!(ctx.device.allocator().live_bytes(HeapType::Upload), 0);
}

// ============================================================================
// Update Tests
// ============================================================================

#[rstest]
#[case::immediate(ExecutionMode::Immediate)]
#[case::threaded(ExecutionMode::Threaded)]
fn test_end_to_end_red_block(#[case] mode: ExecutionMode) {
    let ctx = TestContext::new(mode);
    let desc = TextureDescriptor::new_2d(512, 512, PixelFormat::Rgba8Unorm).with_mip_levels(4);
    let texture = ctx.create(&desc);

    let red: Vec<[u8; 4]> = vec![[255, 0, 0, 255]; 64 * 64];
    texture
        .update_region(
            &UpdateTextureRegion::new_2d(0, 0, 0, 64, 64),
            SourceLayout::new(64 * 4, 64),
            bytemuck::cast_slice(&red),
        )
        .unwrap();
    ctx.device.flush().unwrap();

    let data = ctx.read_subresource(&texture, 0);
    for x in 0..64 {
        assert_eq!(get_pixel(&data, 512, x, 0), [255, 0, 0, 255], "pixel {x}");
    }
    assert_eq!(get_pixel(&data, 512, 65, 0), [0, 0, 0, 0]);
    assert_eq!(get_pixel(&data, 512, 0, 64), [0, 0, 0, 0]);
}

#[rstest]
#[case::immediate(ExecutionMode::Immediate)]
#[case::threaded(ExecutionMode::Threaded)]
fn test_overlapping_updates_keep_issue_order(#[case] mode: ExecutionMode) {
    let ctx = TestContext::new(mode);
    let texture = ctx.create_texture_2d(32, 32, PixelFormat::Rgba8Unorm);

    let a = vec![0xAAu8; 16 * 16 * 4];
    let b = vec![0xBBu8; 16 * 16 * 4];
    texture
        .update_region(
            &UpdateTextureRegion::new_2d(0, 0, 0, 16, 16),
            SourceLayout::new(16 * 4, 16),
            &a,
        )
        .unwrap();
    texture
        .update_region(
            &UpdateTextureRegion::new_2d(0, 8, 8, 16, 16),
            SourceLayout::new(16 * 4, 16),
            &b,
        )
        .unwrap();
    ctx.device.flush().unwrap();

    let data = ctx.read_subresource(&texture, 0);
    assert_eq!(get_pixel(&data, 32, 0, 0), [0xAA; 4]);
    assert_eq!(get_pixel(&data, 32, 8, 8), [0xBB; 4]);
    assert_eq!(get_pixel(&data, 32, 15, 15), [0xBB; 4]);
    assert_eq!(get_pixel(&data, 32, 23, 23), [0xBB; 4]);
    assert_eq!(get_pixel(&data, 32, 24, 24), [0; 4]);
}

#[test]
fn test_update_with_padded_source_rows() {
    let ctx = TestContext::new(ExecutionMode::Immediate);
    let texture = ctx.create_texture_2d(4, 4, PixelFormat::R8Unorm);

    // Two rows of two texels, each row padded to 8 bytes.
    let src = [1u8, 2, 0, 0, 0, 0, 0, 0, 3, 4];
    texture
        .update_region(
            &UpdateTextureRegion::new_2d(0, 2, 1, 2, 2),
            SourceLayout::new(8, 2),
            &src,
        )
        .unwrap();

    let data = ctx.read_subresource(&texture, 0);
    assert_eq!(&data[4..8], &[0, 0, 1, 2]);
    assert_eq!(&data[8..12], &[0, 0, 3, 4]);
}

#[test]
fn test_whole_subresource_update() {
    let ctx = TestContext::new(ExecutionMode::Immediate);
    let desc = TextureDescriptor::new_2d(8, 8, PixelFormat::Rgba8Unorm).with_mip_levels(2);
    let texture = ctx.create(&desc);

    let pattern = generate_test_pattern(4 * 4 * 4, 9);
    texture
        .update_region(
            &UpdateTextureRegion::new_2d(1, 0, 0, 4, 4),
            SourceLayout::new(16, 4),
            &pattern,
        )
        .unwrap();
    assert!(!texture.is_locked(1));
    assert_eq!(ctx.read_subresource(&texture, 1), pattern);
}

#[test]
fn test_update_validation() {
    let ctx = TestContext::new(ExecutionMode::Immediate);
    let texture = ctx.create_texture_2d(16, 16, PixelFormat::Bc1RgbaUnorm);
    let data = vec![0u8; 1024];

    // Misaligned origin.
    assert!(matches!(
        texture.update_region(
            &UpdateTextureRegion::new_2d(0, 2, 0, 4, 4),
            SourceLayout::new(8, 1),
            &data
        ),
        Err(RhiError::InvalidParameter(_))
    ));
    // Out of bounds.
    assert!(matches!(
        texture.update_region(
            &UpdateTextureRegion::new_2d(0, 12, 0, 8, 4),
            SourceLayout::new(16, 1),
            &data
        ),
        Err(RhiError::InvalidParameter(_))
    ));
    // Short source.
    assert!(matches!(
        texture.update_region(
            &UpdateTextureRegion::new_2d(0, 0, 0, 16, 16),
            SourceLayout::new(32, 4),
            &data[..64]
        ),
        Err(RhiError::InvalidParameter(_))
    ));
    // Empty boxes record nothing.
    let before = ctx.device.pending_release_count();
    texture
        .update_region(
            &UpdateTextureRegion::new_2d(0, 0, 0, 0, 0),
            SourceLayout::new(0, 0),
            &[],
        )
        .unwrap();
    assert_eq!(ctx.device.pending_release_count(), before);
}

// ============================================================================
// Initial Data Tests
// ============================================================================

#[test]
fn test_initial_data_lands_in_every_mip() {
    let ctx = TestContext::new(ExecutionMode::Immediate);
    let desc = TextureDescriptor::new_2d(8, 8, PixelFormat::Rgba8Unorm).with_mip_levels(2);
    let data = generate_test_pattern(8 * 8 * 4 + 4 * 4 * 4, 5);

    let texture = ctx.device.create_texture(&desc, Some(&data), "initial").unwrap();
    assert_eq!(
        texture.resource(0).unwrap().state(),
        ResourceState::ShaderResource
    );

    assert_eq!(ctx.read_subresource(&texture, 0), data[..256]);
    assert_eq!(ctx.read_subresource(&texture, 1), data[256..]);

    ctx.device.flush().unwrap();
    assert_eq!(ctx.device.allocator().live_bytes(HeapType::Upload), 0);
    assert!(ctx.backend.validation_errors().is_empty());
}

#[test]
fn test_huge_cube_array_is_rejected() {
    let ctx = TestContext::new(ExecutionMode::Immediate);
    let desc =
        TextureDescriptor::new_cube(16, PixelFormat::Rgba8Unorm).with_array_size(u32::MAX / 2);
    assert_eq!(desc.layer_count(), u32::MAX);
    assert!(matches!(
        ctx.device.create_texture(&desc, None, "huge"),
        Err(RhiError::UnsupportedLayout(_))
    ));
    assert_eq!(ctx.device.texture_count(), 0);
}

#[test]
fn test_short_initial_data_is_rejected() {
    let ctx = TestContext::new(ExecutionMode::Immediate);
    let desc = TextureDescriptor::new_2d(8, 8, PixelFormat::Rgba8Unorm);
    assert!(matches!(
        ctx.device.create_texture(&desc, Some(&[0u8; 16]), "short"),
        Err(RhiError::InvalidParameter(_))
    ));
}

// ============================================================================
// Copy Tests
// ============================================================================

#[test]
fn test_copy_region_between_textures() {
    let ctx = TestContext::new(ExecutionMode::Immediate);
    let src = ctx.create_texture_2d(32, 32, PixelFormat::Rgba8Unorm);
    let dst = ctx.create_texture_2d(32, 32, PixelFormat::Rgba8Unorm);
    let pattern = generate_test_pattern(32 * 32 * 4, 11);
    ctx.write_subresource(&src, 0, &pattern);

    let info = CopyTextureInfo::default().with_region(
        Origin3d::new(16, 16, 0),
        Origin3d::new(0, 0, 0),
        Extent3d::new_2d(16, 16),
    );
    ctx.device
        .copy_texture(&src, &dst, &info, CopyTextureOptions::default())
        .unwrap();

    let copied = ctx.read_subresource(&dst, 0);
    assert_eq!(get_pixel(&copied, 32, 0, 0), get_pixel(&pattern, 32, 16, 16));
    assert_eq!(get_pixel(&copied, 32, 15, 15), get_pixel(&pattern, 32, 31, 31));
    assert_eq!(get_pixel(&copied, 32, 16, 0), [0; 4]);

    // Both textures are back in their initial state.
    assert_eq!(src.resource(0).unwrap().state(), ResourceState::ShaderResource);
    assert_eq!(dst.resource(0).unwrap().state(), ResourceState::ShaderResource);
    assert!(ctx.backend.validation_errors().is_empty());
}

#[test]
fn test_whole_copy_can_stay_in_copy_state() {
    let ctx = TestContext::new(ExecutionMode::Immediate);
    let desc = TextureDescriptor::new_2d(16, 16, PixelFormat::Rgba8Unorm).with_mip_levels(3);
    let data = generate_test_pattern(16 * 16 * 4 + 8 * 8 * 4 + 4 * 4 * 4, 2);
    let src = ctx.device.create_texture(&desc, Some(&data), "src").unwrap();
    let dst = ctx.create(&desc);

    ctx.device
        .copy_texture(
            &src,
            &dst,
            &CopyTextureInfo::whole(&desc),
            CopyTextureOptions {
                leave_in_copy_state: true,
            },
        )
        .unwrap();
    assert_eq!(src.resource(0).unwrap().state(), ResourceState::CopySource);
    assert_eq!(dst.resource(0).unwrap().state(), ResourceState::CopyDest);

    assert_eq!(ctx.read_subresource(&dst, 2), data[16 * 16 * 4 + 8 * 8 * 4..]);
}

#[test]
fn test_copy_rejects_misaligned_block_regions() {
    let ctx = TestContext::new(ExecutionMode::Immediate);
    let src = ctx.create_texture_2d(64, 64, PixelFormat::Bc1RgbaUnorm);
    let dst = ctx.create_texture_2d(64, 64, PixelFormat::Bc1RgbaUnorm);

    let misaligned_src = CopyTextureInfo::default().with_region(
        Origin3d::new(2, 0, 0),
        Origin3d::new(0, 0, 0),
        Extent3d::new_2d(8, 8),
    );
    assert!(matches!(
        ctx.device
            .copy_texture(&src, &dst, &misaligned_src, CopyTextureOptions::default()),
        Err(RhiError::InvalidParameter(_))
    ));

    let misaligned_dst = CopyTextureInfo::default().with_region(
        Origin3d::new(0, 0, 0),
        Origin3d::new(4, 6, 0),
        Extent3d::new_2d(8, 8),
    );
    assert!(matches!(
        ctx.device
            .copy_texture(&src, &dst, &misaligned_dst, CopyTextureOptions::default()),
        Err(RhiError::InvalidParameter(_))
    ));
}

#[test]
fn test_copy_rejects_incompatible_formats_and_self_copies() {
    let ctx = TestContext::new(ExecutionMode::Immediate);
    let rgba = ctx.create_texture_2d(16, 16, PixelFormat::Rgba8Unorm);
    let float = ctx.create_texture_2d(16, 16, PixelFormat::R32Float);

    assert!(matches!(
        ctx.device.copy_texture(
            &rgba,
            &float,
            &CopyTextureInfo::default(),
            CopyTextureOptions::default()
        ),
        Err(RhiError::InvalidParameter(_))
    ));
    assert!(matches!(
        ctx.device.copy_texture(
            &rgba,
            &rgba,
            &CopyTextureInfo::default(),
            CopyTextureOptions::default()
        ),
        Err(RhiError::InvalidParameter(_))
    ));
}

#[test]
fn test_copy_rejects_overflowing_ranges() {
    let ctx = TestContext::new(ExecutionMode::Immediate);
    let desc = TextureDescriptor::new_2d(16, 16, PixelFormat::Rgba8Unorm).with_mip_levels(3);
    let src = ctx.create(&desc);
    let dst = ctx.create(&desc);

    let mips = CopyTextureInfo {
        source_mip: 1,
        num_mips: u32::MAX,
        ..CopyTextureInfo::default()
    };
    assert!(matches!(
        ctx.device
            .copy_texture(&src, &dst, &mips, CopyTextureOptions::default()),
        Err(RhiError::InvalidParameter(_))
    ));

    let layers = CopyTextureInfo {
        dest_layer: 1,
        num_layers: u32::MAX,
        ..CopyTextureInfo::default()
    };
    assert!(matches!(
        ctx.device
            .copy_texture(&src, &dst, &layers, CopyTextureOptions::default()),
        Err(RhiError::InvalidParameter(_))
    ));
    assert_eq!(src.resource(0).unwrap().state(), ResourceState::ShaderResource);
}

#[test]
fn test_partial_depth_stencil_copy_includes_stencil() {
    let ctx = TestContext::new(ExecutionMode::Immediate);
    let desc = TextureDescriptor::new_2d(16, 16, PixelFormat::Depth24PlusStencil8);
    let src = ctx.create(&desc);
    let dst = ctx.create(&desc);
    assert_eq!(desc.subresource_count(), 2);

    let depth = generate_test_pattern(16 * 16 * 4, 21);
    let stencil = generate_test_pattern(16 * 16, 22);
    ctx.write_subresource(&src, 0, &depth);
    ctx.write_subresource(&src, 1, &stencil);

    let info = CopyTextureInfo::default().with_region(
        Origin3d::new(0, 0, 0),
        Origin3d::new(8, 8, 0),
        Extent3d::new_2d(8, 8),
    );
    ctx.device
        .copy_texture(&src, &dst, &info, CopyTextureOptions::default())
        .unwrap();

    let copied_depth = ctx.read_subresource(&dst, 0);
    assert_eq!(get_pixel(&copied_depth, 16, 8, 8), get_pixel(&depth, 16, 0, 0));
    assert_eq!(get_pixel(&copied_depth, 16, 15, 15), get_pixel(&depth, 16, 7, 7));
    assert_eq!(get_pixel(&copied_depth, 16, 0, 0), [0; 4]);

    let copied_stencil = ctx.read_subresource(&dst, 1);
    assert_eq!(copied_stencil[8 * 16 + 8], stencil[0]);
    assert_eq!(copied_stencil[15 * 16 + 15], stencil[7 * 16 + 7]);
    assert_eq!(copied_stencil[0], 0);
    assert!(ctx.backend.validation_errors().is_empty());
}

#[test]
fn test_copy_into_readback_texture() {
    let ctx = TestContext::new(ExecutionMode::Immediate);
    let src = ctx.create_texture_2d(32, 32, PixelFormat::Rgba8Unorm);
    let pattern = generate_test_pattern(32 * 32 * 4, 4);
    ctx.write_subresource(&src, 0, &pattern);

    let readback = ctx.create(
        &TextureDescriptor::new_2d(32, 32, PixelFormat::Rgba8Unorm)
            .with_flags(TextureFlags::CPU_READBACK),
    );
    let fp = readback.readback_footprint(0).unwrap();
    assert_eq!(fp.row_pitch, 256);
    assert_eq!(readback.readback_footprint(0).unwrap(), fp);

    ctx.device
        .copy_texture(
            &src,
            &readback,
            &CopyTextureInfo::default(),
            CopyTextureOptions::default(),
        )
        .unwrap();

    assert!(matches!(
        readback.lock(0, LockMode::WriteOnly),
        Err(RhiError::InvalidState(_))
    ));
    assert_eq!(ctx.read_subresource(&readback, 0), pattern);

    assert!(matches!(
        src.readback_footprint(0),
        Err(RhiError::InvalidState(_))
    ));
}

// ============================================================================
// Lifetime Tests
// ============================================================================

#[test]
fn test_aliased_textures_share_storage() {
    let ctx = TestContext::new(ExecutionMode::Immediate);
    let source = ctx.create_texture_2d(16, 16, PixelFormat::Rgba8Unorm);
    let dest = ctx.create_texture_2d(16, 16, PixelFormat::Rgba8UnormSrgb);

    ctx.device.alias(&dest, &source).unwrap();
    assert!(dest.is_aliased());
    assert_eq!(dest.native_id(0), source.native_id(0));
    assert_eq!(ctx.device.pending_release_count(), 1);

    let pattern = generate_test_pattern(8 * 8 * 4, 6);
    source
        .update_region(
            &UpdateTextureRegion::new_2d(0, 0, 0, 8, 8),
            SourceLayout::new(32, 8),
            &pattern,
        )
        .unwrap();
    ctx.device.flush().unwrap();

    let seen = ctx.read_subresource(&dest, 0);
    assert_eq!(get_pixel(&seen, 16, 7, 7), get_pixel(&pattern, 8, 7, 7));

    // The memory stays alive while either handle does.
    drop(source);
    ctx.device.flush().unwrap();
    assert!(ctx.backend.texture_count() >= 1);
    assert_eq!(ctx.read_subresource(&dest, 0), seen);
}

#[test]
fn test_alias_requires_matching_layout() {
    let ctx = TestContext::new(ExecutionMode::Immediate);
    let small = ctx.create_texture_2d(16, 16, PixelFormat::Rgba8Unorm);
    let large = ctx.create_texture_2d(32, 32, PixelFormat::Rgba8Unorm);
    assert!(matches!(
        ctx.device.alias(&small, &large),
        Err(RhiError::InvalidParameter(_))
    ));

    let other = ctx.create_texture_2d(16, 16, PixelFormat::Rgba8Unorm);
    let _locked = other.lock(0, LockMode::WriteOnly).unwrap();
    assert!(matches!(
        ctx.device.alias(&small, &other),
        Err(RhiError::InvalidState(_))
    ));
}

#[rstest]
#[case::immediate(ExecutionMode::Immediate)]
#[case::threaded(ExecutionMode::Threaded)]
fn test_async_reallocate_copies_shared_mips(#[case] mode: ExecutionMode) {
    let ctx = TestContext::new(mode);
    let desc = TextureDescriptor::new_2d(16, 16, PixelFormat::Rgba8Unorm).with_mip_levels(5);
    let texture = ctx.create(&desc);
    let mip0 = generate_test_pattern(16 * 16 * 4, 8);
    let mip2 = generate_test_pattern(4 * 4 * 4, 9);
    ctx.write_subresource(&texture, 0, &mip0);
    ctx.write_subresource(&texture, 2, &mip2);

    let status = ReallocationStatus::new();
    let grown = ctx
        .device
        .async_reallocate(&texture, 6, Extent3d::new_2d(32, 32), &status)
        .unwrap();
    assert_eq!(grown.mip_level_count(), 6);
    assert_eq!(status.pending(), 1);

    ctx.device.flush().unwrap();
    assert!(status.is_complete());

    // Mips line up from the smallest: old mip N is new mip N + 1.
    assert_eq!(ctx.read_subresource(&grown, 1), mip0);
    assert_eq!(ctx.read_subresource(&grown, 3), mip2);
    assert_eq!(ctx.read_subresource(&grown, 0), vec![0u8; 32 * 32 * 4]);
}

#[test]
fn test_async_reallocate_shrinks() {
    let ctx = TestContext::new(ExecutionMode::Immediate);
    let desc = TextureDescriptor::new_2d(16, 16, PixelFormat::Rgba8Unorm).with_mip_levels(3);
    let texture = ctx.create(&desc);
    let mip1 = generate_test_pattern(8 * 8 * 4, 12);
    ctx.write_subresource(&texture, 1, &mip1);

    let status = ReallocationStatus::new();
    let shrunk = ctx
        .device
        .async_reallocate(&texture, 2, Extent3d::new_2d(8, 8), &status)
        .unwrap();
    ctx.device.flush().unwrap();
    assert!(status.is_complete());
    assert_eq!(ctx.read_subresource(&shrunk, 0), mip1);
}

#[test]
fn test_peers_on_every_node() {
    let ctx = TestContext::with_config(
        RhiConfig::default()
            .with_gpu_node_count(2)
            .with_validation(true),
    );
    let desc = TextureDescriptor::new_2d(8, 8, PixelFormat::Rgba8Unorm);
    let data = generate_test_pattern(8 * 8 * 4, 13);
    let texture = ctx.device.create_texture(&desc, Some(&data), "linked").unwrap();
    ctx.device.flush().unwrap();

    assert_eq!(texture.peers().len(), 2);
    for node in 0..2 {
        let id = texture.native_id(node).unwrap();
        assert_eq!(ctx.backend.texture_node(id), Some(node));
        assert_eq!(ctx.backend.read_subresource(id, 0), Some(data.clone()));
        assert!(texture.views(node).unwrap().shader_resource().is_some());
    }
    assert_eq!(ctx.stats.snapshot().texture_count, 1);
}

#[test]
fn test_allocation_failure_leaves_nothing_behind() {
    let ctx = TestContext::new(ExecutionMode::Immediate);
    ctx.backend.fail_next_heap_allocations(1);

    let desc = TextureDescriptor::new_2d(256, 256, PixelFormat::Rgba8Unorm)
        .with_flags(TextureFlags::RENDER_TARGET)
        .with_initial_state(ResourceState::RenderTarget);
    let result = ctx.device.create_texture(&desc, None, "doomed");
    assert!(matches!(
        result,
        Err(RhiError::AllocationFailed {
            heap_type: HeapType::Default,
            ..
        })
    ));
    assert_eq!(ctx.backend.texture_count(), 0);
    assert_eq!(ctx.device.texture_count(), 0);
    assert_eq!(ctx.stats.snapshot().texture_count, 0);

    // The next attempt succeeds.
    let texture = ctx.device.create_texture(&desc, None, "retry").unwrap();
    assert!(texture.memory_size() >= 256 * 256 * 4);
}

#[rstest]
#[case::immediate(ExecutionMode::Immediate)]
#[case::threaded(ExecutionMode::Threaded)]
fn test_failed_copy_is_reported_by_flush(#[case] mode: ExecutionMode) {
    let ctx = TestContext::new(mode);
    let texture = ctx.create_texture_2d(8, 8, PixelFormat::Rgba8Unorm);
    ctx.device.flush().unwrap();

    ctx.backend.fail_next_copies(1);
    texture
        .update_region(
            &UpdateTextureRegion::new_2d(0, 0, 0, 4, 4),
            SourceLayout::new(16, 4),
            &[0x22; 64],
        )
        .unwrap();
    assert!(matches!(
        ctx.device.flush(),
        Err(RhiError::CommandFailed { ref command, node: 0, .. })
            if command == "CopyBufferToTexture"
    ));
    // The staging buffer is still retired and the device keeps working.
    assert_eq!(ctx.device.allocator().live_bytes(HeapType::Upload), 0);
    ctx.device.flush().unwrap();

    let pattern = generate_test_pattern(8 * 8 * 4, 23);
    ctx.write_subresource(&texture, 0, &pattern);
    assert_eq!(ctx.read_subresource(&texture, 0), pattern);
}

#[test]
fn test_device_lost_is_reported() {
    let ctx = TestContext::new(ExecutionMode::Immediate);
    let texture = ctx.create_texture_2d(8, 8, PixelFormat::Rgba8Unorm);
    ctx.device.flush().unwrap();

    // Recorded before the loss, executed after it.
    texture
        .update_region(
            &UpdateTextureRegion::new_2d(0, 0, 0, 4, 4),
            SourceLayout::new(16, 4),
            &[0x11; 64],
        )
        .unwrap();
    ctx.backend.lose_device();
    assert!(matches!(ctx.device.flush(), Err(RhiError::DeviceLost)));
    assert!(matches!(
        texture.lock(0, LockMode::ReadOnly),
        Err(RhiError::DeviceLost)
    ));
}

#[test]
fn test_memory_budget_tracks_device_heaps() {
    let ctx = TestContext::with_config(
        RhiConfig::default()
            .with_device_memory_budget(256 * 1024 * 1024)
            .with_validation(true),
    );
    assert_eq!(ctx.device.memory_budget().usage, 0);

    let texture = ctx.create_texture_2d(64, 64, PixelFormat::Rgba8Unorm);
    let budget = ctx.device.memory_budget();
    assert!(budget.usage > 0);
    assert_eq!(budget.available(), budget.budget - budget.usage);

    ctx.device.destroy_texture(texture);
    ctx.device.flush().unwrap();
    ctx.device.trim_memory();
    assert_eq!(ctx.device.memory_budget().usage, 0);
}
