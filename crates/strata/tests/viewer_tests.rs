//! End-to-end frames through the viewer on a recording device.

use std::time::{Duration, Instant};

use proptest::prelude::*;
use strata::{
    Camera, ClipPlane, DeviceCommand, GeometryCategory, GraphicsDevice, ModelHandle,
    NodeAppearance, ObjectSet, RenderOptions, SectorGeometry, TraceDevice, UniformValue, Vec3, Viewer,
};

const MODEL: ModelHandle = ModelHandle::from_raw(1);

fn boxes(objects: std::ops::Range<u32>) -> SectorGeometry {
    let stride = GeometryCategory::Box.instance_stride().unwrap();
    let mut bytes = vec![0u8; stride * objects.len()];
    for (record, object) in bytes.chunks_exact_mut(stride).zip(objects) {
        record[..4].copy_from_slice(&object.to_le_bytes());
    }
    SectorGeometry::primitive(GeometryCategory::Box, bytes)
}

fn viewer_with_model(device: &mut TraceDevice) -> Viewer {
    let mut viewer = Viewer::default();
    viewer.add_cad_model(device, MODEL, 32).unwrap();
    viewer.submit_sector(MODEL, 0, &[boxes(0..16)]).unwrap();
    viewer.submit_sector(MODEL, 1, &[boxes(16..32)]).unwrap();
    viewer
}

#[test]
fn test_frame_draws_batched_sectors_once() {
    let mut device = TraceDevice::new(64, 64);
    let mut viewer = viewer_with_model(&mut device);

    let ran = viewer
        .render(&mut device, &Camera::default(), Instant::now())
        .unwrap();
    assert_eq!(ran, 4);

    let instance_counts: Vec<u32> = device
        .commands()
        .iter()
        .filter_map(|command| match command {
            DeviceCommand::Draw {
                label,
                instance_count,
                ..
            } if label.starts_with("cad-back") => Some(*instance_count),
            _ => None,
        })
        .collect();
    assert_eq!(instance_counts, vec![32]);
    // The blit lands on the host's target.
    assert_eq!(device.render_target(), None);
}

#[test]
fn test_style_rebuilds_are_throttled_across_frames() {
    let mut device = TraceDevice::new(64, 64);
    let mut viewer = viewer_with_model(&mut device);
    let camera = Camera::default();
    let start = Instant::now();
    viewer.render(&mut device, &camera, start).unwrap();

    let hidden = ObjectSet::from_range(0..4);
    viewer
        .style_index_mut(MODEL)
        .unwrap()
        .assign(&hidden, NodeAppearance::HIDDEN)
        .unwrap();
    viewer.render(&mut device, &camera, start).unwrap();
    assert_eq!(viewer.materials().style_index(MODEL).unwrap().invisible().count(), 4);

    // A second edit inside the window waits for it to elapse.
    viewer
        .style_index_mut(MODEL)
        .unwrap()
        .assign(&ObjectSet::from_range(4..8), NodeAppearance::GHOSTED)
        .unwrap();
    viewer
        .render(&mut device, &camera, start + Duration::from_millis(5))
        .unwrap();
    assert!(viewer.materials().style_index(MODEL).unwrap().ghosted().is_empty());

    viewer
        .render(&mut device, &camera, start + Duration::from_millis(40))
        .unwrap();
    assert_eq!(viewer.materials().style_index(MODEL).unwrap().ghosted().count(), 4);
    assert!(device
        .draw_labels()
        .iter()
        .any(|label| label.starts_with("cad-ghost")));
}

#[test]
fn test_render_steps_runs_a_prefix() {
    let mut device = TraceDevice::new(64, 64);
    let mut viewer = viewer_with_model(&mut device);
    let ran = viewer
        .render_steps(&mut device, &Camera::default(), Instant::now(), 1)
        .unwrap();
    assert_eq!(ran, 1);
    assert!(device
        .draw_labels()
        .iter()
        .all(|label| label.starts_with("cad-back")));
    assert_eq!(device.render_target(), None);
}

#[test]
fn test_global_clip_planes_reach_every_registry() {
    let mut device = TraceDevice::new(8, 8);
    let mut viewer = viewer_with_model(&mut device);
    let points = ModelHandle::from_raw(2);
    viewer.add_point_cloud_model(points).unwrap();

    viewer.set_clip_planes(vec![ClipPlane::new(Vec3::ZERO, Vec3::X)]);
    assert_eq!(viewer.materials().clip_planes(MODEL).unwrap().len(), 1);
    assert_eq!(viewer.point_clouds().clip_planes().len(), 1);
}

#[test]
fn test_remove_point_cloud_model_releases_nodes() {
    let mut device = TraceDevice::new(8, 8);
    let mut viewer = Viewer::default();
    let points = ModelHandle::from_raw(2);
    viewer.add_point_cloud_model(points).unwrap();
    viewer
        .point_clouds_mut()
        .add_node(&mut device, points, 0, &[0; 64], 4)
        .unwrap();
    assert_eq!(device.buffer_count(), 1);

    viewer.remove_point_cloud_model(&mut device, points).unwrap();
    assert_eq!(device.buffer_count(), 0);
    assert!(viewer.point_clouds().is_empty());
    assert!(viewer.remove_point_cloud_model(&mut device, points).is_err());
}

#[test]
fn test_material_parameters_through_viewer() {
    let mut device = TraceDevice::new(8, 8);
    let mut viewer = viewer_with_model(&mut device);
    let opacity = UniformValue::F32(0.5);
    assert!(viewer
        .materials_mut()
        .set_material_parameter(MODEL, GeometryCategory::Box, "opacity", opacity)
        .unwrap());
    let material = viewer.materials().material_set(MODEL).unwrap();
    assert_eq!(material.material(GeometryCategory::Box).parameter("opacity"), Some(&opacity));
}

#[test]
fn test_dispose_releases_device_resources() {
    let mut device = TraceDevice::new(32, 32);
    let mut viewer = viewer_with_model(&mut device);
    let points = ModelHandle::from_raw(2);
    viewer.add_point_cloud_model(points).unwrap();
    viewer
        .point_clouds_mut()
        .add_node(&mut device, points, 0, &[0; 64], 4)
        .unwrap();
    viewer
        .render(&mut device, &Camera::default(), Instant::now())
        .unwrap();

    viewer.dispose(&mut device).unwrap();
    assert_eq!(device.buffer_count(), 0);
    assert_eq!(device.target_count(), 0);
    assert!(viewer.materials().is_empty());
    assert!(viewer.point_clouds().is_empty());
    assert!(viewer.batcher(MODEL).is_err());
}

proptest! {
    #[test]
    fn prop_instance_count_matches_loaded_sectors(
        ops in proptest::collection::vec((any::<bool>(), 0u64..6), 1..40)
    ) {
        let mut device = TraceDevice::new(8, 8);
        let mut viewer = Viewer::default();
        viewer.add_cad_model(&mut device, MODEL, 60).unwrap();
        let mut loaded = std::collections::BTreeSet::new();

        for (add, sector) in ops {
            let first = sector as u32 * 10;
            if add {
                let inserted = viewer
                    .submit_sector(MODEL, sector, &[boxes(first..first + 10)])
                    .unwrap();
                prop_assert_eq!(inserted, loaded.insert(sector));
            } else {
                let removed = viewer.remove_sector(MODEL, sector).unwrap();
                prop_assert_eq!(removed, loaded.remove(&sector));
            }
        }

        let batcher = viewer.batcher(MODEL).unwrap();
        let count = batcher
            .draw_object(GeometryCategory::Box, 0)
            .map_or(0, |object| object.instance_count());
        prop_assert_eq!(count as usize, loaded.len() * 10);
        prop_assert_eq!(batcher.sector_count(), loaded.len());
    }
}
