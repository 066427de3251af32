//! Headless rendering integration tests.
//!
//! These tests need a GPU adapter (real or software fallback). Without one,
//! each test prints a note and returns early.

use volscope::*;

const RED: [f64; 3] = [1.0, 0.0, 0.0];

fn renderer(width: u32, height: u32) -> Option<HeadlessRenderer> {
    match HeadlessRenderer::new(width, height, VolumePassOptions::default()) {
        Ok(renderer) => Some(renderer),
        Err(e) => {
            eprintln!("Skipping headless test: no GPU adapter available ({e})");
            None
        }
    }
}

/// An 8^3 ramp along x, fully opaque and red across its scalar range.
fn opaque_red_volume() -> VolumeHandle {
    let image = ImageData::from_fn([8, 8, 8], |i, _, _| i as f32).unwrap();
    let mut volume = Volume::new(VolumeMapper::new(image));
    let mut color = ColorTransferFunction::new();
    color.add_rgb_point(0.0, RED);
    color.add_rgb_point(7.0, RED);
    volume
        .property_mut()
        .set_rgb_transfer_function(0, color)
        .unwrap();
    volume
        .property_mut()
        .set_scalar_opacity(0, PiecewiseFunction::from_points(&[(0.0, 1.0), (7.0, 1.0)]))
        .unwrap();
    volume.into_handle()
}

fn camera_on_volume() -> Camera {
    let mut camera = Camera::new(1.0);
    camera.look_at_box(DVec3::ZERO, DVec3::splat(7.0));
    camera
}

fn pixel(pixels: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let i = ((y * width + x) * 4) as usize;
    [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]]
}

#[test]
fn headless_empty_volume_list_is_an_error() {
    let Some(mut renderer) = renderer(32, 32) else {
        return;
    };
    let result = renderer.render(&[], &Camera::new(1.0));
    assert!(matches!(
        result,
        Err(VolscopeError::Render(RenderError::NoVolumes))
    ));
}

#[test]
fn headless_single_volume_composites_onto_background() {
    let Some(mut renderer) = renderer(64, 64) else {
        return;
    };
    let volume = opaque_red_volume();
    let pixels = renderer.render(&[volume], &camera_on_volume()).unwrap();
    assert_eq!(pixels.len(), 64 * 64 * 4);

    let center = pixel(&pixels, 64, 32, 32);
    assert!(center[0] > 200, "center pixel should be red: {center:?}");
    assert!(center[1] < 50 && center[2] < 50, "center pixel: {center:?}");

    // The volume does not reach the corners
    assert_eq!(pixel(&pixels, 64, 0, 0), [0, 0, 0, 255]);
    assert_eq!(renderer.pass().pipeline_hash(), "volfsq1b0");
}

#[test]
fn headless_two_volumes_share_one_pipeline_hash() {
    let Some(mut renderer) = renderer(48, 48) else {
        return;
    };
    let near = opaque_red_volume();
    let far = opaque_red_volume();
    far.borrow_mut().set_position(DVec3::new(0.0, 0.0, -20.0));

    let camera = camera_on_volume();
    let first = renderer.render(&[near.clone(), far.clone()], &camera).unwrap();
    assert_eq!(renderer.pass().pipeline_hash(), "volfsq2b0");

    // Rendering again with nothing changed gives the same image
    let second = renderer.render(&[near, far], &camera).unwrap();
    assert_eq!(first, second);
}

#[test]
fn headless_empty_ray_bounds_leave_background() {
    let Some(mut renderer) = renderer(16, 16) else {
        return;
    };
    renderer.set_background(wgpu::Color::BLUE);
    renderer
        .set_depth_bounds(vec![0.5; 16 * 16], vec![0.5; 16 * 16])
        .unwrap();

    let pixels = renderer
        .render(&[opaque_red_volume()], &camera_on_volume())
        .unwrap();
    assert!(pixels.chunks(4).all(|px| px == [0, 0, 255, 255]));
}

#[test]
fn headless_depth_bounds_size_checked() {
    let Some(mut renderer) = renderer(16, 16) else {
        return;
    };
    let err = renderer
        .set_depth_bounds(vec![0.0; 10], vec![1.0; 16 * 16])
        .unwrap_err();
    assert!(matches!(
        err,
        VolscopeError::DepthSizeMismatch {
            expected: 256,
            actual: 10
        }
    ));
}

#[test]
fn headless_degenerate_opacity_range_is_reported() {
    let Some(mut renderer) = renderer(16, 16) else {
        return;
    };
    let volume = opaque_red_volume();
    volume
        .borrow_mut()
        .property_mut()
        .set_scalar_opacity(0, PiecewiseFunction::from_points(&[(3.0, 1.0)]))
        .unwrap();

    let result = renderer.render(&[volume], &camera_on_volume());
    assert!(matches!(
        result,
        Err(VolscopeError::Render(RenderError::DegenerateRange {
            function: "opacity",
            ..
        }))
    ));
}

#[test]
fn headless_unchanged_frame_allocates_no_textures() {
    let Some(mut renderer) = renderer(32, 32) else {
        return;
    };
    let volumes = vec![opaque_red_volume(), opaque_red_volume()];
    let camera = camera_on_volume();

    renderer.render(&volumes, &camera).unwrap();
    let first = renderer.device().texture_manager().allocation_count();
    assert!(first > 0);

    renderer.render(&volumes, &camera).unwrap();
    assert_eq!(renderer.device().texture_manager().allocation_count(), first);
}

#[test]
fn headless_oversized_lookup_table_is_an_error_every_frame() {
    let options = VolumePassOptions {
        row_length: 1 << 16,
        ..VolumePassOptions::default()
    };
    let Ok(mut renderer) = HeadlessRenderer::new(16, 16, options) else {
        eprintln!("Skipping headless test: no GPU adapter available");
        return;
    };
    let volumes = vec![opaque_red_volume()];
    let camera = camera_on_volume();

    // The failed upload must leave the table stale, so each frame reports
    // the size error again rather than a missing table.
    for _ in 0..2 {
        let result = renderer.render(&volumes, &camera);
        assert!(matches!(
            result,
            Err(VolscopeError::Render(RenderError::TextureCreationFailed(_)))
        ));
    }

    renderer
        .pass_mut()
        .set_options(VolumePassOptions::default())
        .unwrap();
    let pixels = renderer.render(&volumes, &camera).unwrap();
    assert_eq!(pixels.len(), 16 * 16 * 4);
}
