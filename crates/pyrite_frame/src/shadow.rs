//! Cascaded shadow map split and projection derivation (§4.9's "Shadow
//! cascade derivation").
//!
//! Pure math, no GPU calls — the render task consumes the output to build
//! the shadow pass's per-cascade view-projection matrices.

use glam::{Mat4, Vec3};

use pyrite_scene::BoundingBox;

use crate::scene_view::SceneView;

/// One slice of a cascaded shadow map: its light-space view-projection and
/// the view-space depth at which the camera frustum slice for this cascade
/// ends (used by the main pass to pick a cascade per fragment).
#[derive(Debug, Clone, Copy)]
pub struct Cascade {
    pub view_proj: Mat4,
    pub split_depth: f32,
}

/// Computes per-cascade far-split distances via the practical split scheme:
/// `d = lambda * d_log + (1 - lambda) * d_uniform`. `lambda` blends between
/// a uniform split (`0.0`) and a logarithmic one (`1.0`); the last split
/// always lands exactly on `far`.
#[must_use]
pub fn compute_cascade_splits(cascade_count: u32, near: f32, far: f32, lambda: f32) -> Vec<f32> {
    let n = cascade_count.max(1) as usize;
    let mut splits = Vec::with_capacity(n);
    for i in 0..n {
        let p = (i + 1) as f32 / n as f32;
        let log_split = near * (far / near).powf(p);
        let uniform_split = near + (far - near) * p;
        splits.push(lambda * log_split + (1.0 - lambda) * uniform_split);
    }
    if let Some(last) = splits.last_mut() {
        *last = far;
    }
    splits
}

/// Transforms a view-space frustum slice's 8 corners into world space,
/// using the camera's projection matrix to recover the vertical half-FOV
/// and aspect ratio (right-handed, -Z forward).
#[must_use]
pub fn compute_frustum_corners_world(camera_view: Mat4, camera_proj: Mat4, slice_near: f32, slice_far: f32) -> [Vec3; 8] {
    let tan_half_fov = 1.0 / camera_proj.y_axis.y;
    let aspect = camera_proj.y_axis.y / camera_proj.x_axis.x;

    let h_near = tan_half_fov * slice_near;
    let w_near = h_near * aspect;
    let h_far = tan_half_fov * slice_far;
    let w_far = h_far * aspect;

    let corners_view = [
        Vec3::new(-w_near, -h_near, -slice_near),
        Vec3::new(w_near, -h_near, -slice_near),
        Vec3::new(w_near, h_near, -slice_near),
        Vec3::new(-w_near, h_near, -slice_near),
        Vec3::new(-w_far, -h_far, -slice_far),
        Vec3::new(w_far, -h_far, -slice_far),
        Vec3::new(w_far, h_far, -slice_far),
        Vec3::new(-w_far, h_far, -slice_far),
    ];

    let inv_view = camera_view.inverse();
    corners_view.map(|c| inv_view.transform_point3(c))
}

/// Builds the light-space orthographic view-projection for one cascade.
///
/// The XY extent and texel-snapped offset come from the frustum corners'
/// light-space bounding box (prevents edge shimmer as the camera moves);
/// per §4.9 the Z range is then widened to also fit the transformed scene
/// AABB plus a fixed buffer, so casters outside the visible frustum but
/// between it and the light still cast shadows.
#[must_use]
pub fn build_cascade_view_proj(light_direction: Vec3, frustum_corners: &[Vec3; 8], shadow_map_size: u32, scene_world_aabb: BoundingBox, z_buffer: f32) -> Mat4 {
    let safe_dir = if light_direction.length_squared() > 1e-6 {
        light_direction.normalize()
    } else {
        -Vec3::Z
    };

    let center = frustum_corners.iter().copied().sum::<Vec3>() / 8.0;
    let up = if safe_dir.y.abs() > 0.99 { Vec3::X } else { Vec3::Y };
    let light_view = Mat4::look_at_rh(center - safe_dir, center, up);

    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for corner in frustum_corners {
        let ls = light_view.transform_point3(*corner);
        min = min.min(ls);
        max = max.max(ls);
    }

    let scene_aabb = scene_world_aabb.transform(&light_view);
    min.z = min.z.min(scene_aabb.min.z) - z_buffer;
    max.z = max.z.max(scene_aabb.max.z) + z_buffer;

    let texel_x = (max.x - min.x) / shadow_map_size as f32;
    let texel_y = (max.y - min.y) / shadow_map_size as f32;
    if texel_x > 0.0 {
        min.x = (min.x / texel_x).floor() * texel_x;
        max.x = (max.x / texel_x).ceil() * texel_x;
    }
    if texel_y > 0.0 {
        min.y = (min.y / texel_y).floor() * texel_y;
        max.y = (max.y / texel_y).ceil() * texel_y;
    }

    let light_proj = Mat4::orthographic_rh(min.x, max.x, min.y, max.y, -max.z, -min.z);
    light_proj * light_view
}

/// Derives every cascade's view-projection and split depth for the current
/// frame, per §4.9: split depths from [`compute_cascade_splits`], then per
/// cascade the frustum-corner extraction and texel-snapped projection
/// above. `cascade_count` beyond what `EngineConfig` requests collapses to
/// the far plane automatically since the last split is always pinned there.
#[must_use]
pub fn derive_cascades(view: &SceneView, cascade_count: u32, lambda: f32, light_direction: Vec3, shadow_map_size: u32, scene_world_aabb: BoundingBox, z_buffer: f32) -> Vec<Cascade> {
    let splits = compute_cascade_splits(cascade_count, view.camera_near, view.camera_far, lambda);
    let mut cascades = Vec::with_capacity(splits.len());
    let mut slice_near = view.camera_near;
    for &slice_far in &splits {
        let corners = compute_frustum_corners_world(view.camera_view, view.camera_proj, slice_near, slice_far);
        let view_proj = build_cascade_view_proj(light_direction, &corners, shadow_map_size, scene_world_aabb, z_buffer);
        cascades.push(Cascade { view_proj, split_depth: slice_far });
        slice_near = slice_far;
    }
    cascades
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cascade_splits_are_increasing_and_the_last_reaches_far() {
        let splits = compute_cascade_splits(4, 0.1, 100.0, 0.5);
        assert_eq!(splits.len(), 4);
        assert_eq!(*splits.last().unwrap(), 100.0);
        for pair in splits.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn single_cascade_collapses_directly_to_far() {
        let splits = compute_cascade_splits(1, 0.1, 50.0, 1.0);
        assert_eq!(splits, vec![50.0]);
    }

    #[test]
    fn frustum_corners_are_symmetric_about_the_view_axis() {
        let view = Mat4::IDENTITY;
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 16.0 / 9.0, 0.1, 100.0);
        let corners = compute_frustum_corners_world(view, proj, 1.0, 10.0);
        assert!((corners[0].x + corners[1].x).abs() < 1e-4);
        assert!((corners[0].y + corners[2].y).abs() < 1e-4);
    }

    #[test]
    fn cascade_view_proj_encloses_the_frustum_center() {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 1.0, 0.1, 100.0);
        let corners = compute_frustum_corners_world(view, proj, 1.0, 20.0);
        let view_proj = build_cascade_view_proj(Vec3::new(-1.0, -1.0, -1.0), &corners, 1024, BoundingBox::new(Vec3::splat(-5.0), Vec3::splat(5.0)), 5.0);

        let center = corners.iter().copied().sum::<Vec3>() / 8.0;
        let clip = view_proj * center.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() <= 1.01 && ndc.y.abs() <= 1.01);
    }

    #[test]
    fn derive_cascades_returns_one_entry_per_requested_cascade() {
        let view = SceneView {
            camera_view: Mat4::look_at_rh(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO, Vec3::Y),
            camera_proj: Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 16.0 / 9.0, 0.1, 200.0),
            camera_near: 0.1,
            camera_far: 200.0,
            light_direction: Vec3::new(-0.3, -1.0, -0.2),
            viewport_width: 1920,
            viewport_height: 1080,
            time: 0.0,
        };
        let cascades = derive_cascades(&view, 4, 0.6, view.light_direction, 2048, BoundingBox::new(Vec3::splat(-20.0), Vec3::splat(20.0)), 10.0);
        assert_eq!(cascades.len(), 4);
        assert_eq!(cascades.last().unwrap().split_depth, 200.0);
    }
}
