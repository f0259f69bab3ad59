//! Frame-level behavior of the composite pipeline against a recording device.

use std::time::Instant;

use glam::Vec2;
use strata_core::{
    ModelHandle, NodeAppearance, ObjectSet, RenderOptions, SsaoParameters, StrataError,
};
use strata_render::{
    BasicPipelineExecutor, Camera, CompositePipelineProvider, DrawObjectKey, FrameContext,
    GeometryBatcher, GeometryCategory, GraphicsDevice, InjectedFailure, ModelMaterialRegistry,
    PipelineExecutor, PipelineProvider, PointCloudMaterialRegistry, Program, RenderError,
    SectorGeometry, TextureKey, TraceDevice, UniformValue,
};

const MODEL: ModelHandle = ModelHandle::from_raw(1);

fn boxes(objects: impl IntoIterator<Item = u32>) -> SectorGeometry {
    let stride = GeometryCategory::Box.instance_stride().unwrap();
    let objects: Vec<u32> = objects.into_iter().collect();
    let mut bytes = vec![0u8; stride * objects.len()];
    for (record, object) in bytes.chunks_exact_mut(stride).zip(objects) {
        record[..4].copy_from_slice(&object.to_le_bytes());
    }
    SectorGeometry::primitive(GeometryCategory::Box, bytes)
}

fn no_ssao() -> RenderOptions {
    RenderOptions {
        ssao: SsaoParameters {
            sample_count: 0,
            ..SsaoParameters::default()
        },
        ..RenderOptions::default()
    }
}

struct Scene {
    device: TraceDevice,
    materials: ModelMaterialRegistry,
    points: PointCloudMaterialRegistry,
    batchers: Vec<GeometryBatcher>,
    options: RenderOptions,
    provider: CompositePipelineProvider,
}

impl Scene {
    fn new(options: RenderOptions) -> Self {
        let mut device = TraceDevice::new(32, 32);
        let mut materials = ModelMaterialRegistry::default();
        materials.register_model(&mut device, MODEL, 64).unwrap();
        Self {
            device,
            materials,
            points: PointCloudMaterialRegistry::new(),
            batchers: vec![GeometryBatcher::new(MODEL)],
            options,
            provider: CompositePipelineProvider::new(),
        }
    }

    fn prepare(&mut self) {
        self.materials
            .flush(&mut self.device, Instant::now())
            .unwrap();
        for batcher in &mut self.batchers {
            batcher.sync(&mut self.device).unwrap();
        }
    }

    fn pass_names(&mut self) -> Vec<&'static str> {
        self.prepare();
        let frame = FrameContext {
            materials: &self.materials,
            batchers: &self.batchers,
            point_clouds: &self.points,
            options: &self.options,
        };
        self.provider
            .pipeline(&frame, &mut self.device)
            .unwrap()
            .names()
    }

    fn render(&mut self) -> Result<usize, RenderError> {
        self.prepare();
        let frame = FrameContext {
            materials: &self.materials,
            batchers: &self.batchers,
            point_clouds: &self.points,
            options: &self.options,
        };
        BasicPipelineExecutor::new().render(
            &mut self.provider,
            &frame,
            &mut self.device,
            &Camera::default(),
        )
    }
}

#[test]
fn test_passes_follow_scene_content() {
    let mut scene = Scene::new(no_ssao());
    assert_eq!(scene.pass_names(), vec!["cad-back", "composite", "blit"]);

    scene
        .materials
        .style_index_mut(MODEL)
        .unwrap()
        .assign(&ObjectSet::from_range(0..4), NodeAppearance::GHOSTED)
        .unwrap();
    assert_eq!(
        scene.pass_names(),
        vec!["cad-back", "cad-ghost", "composite", "blit"]
    );
}

#[test]
fn test_targets_resize_once_per_viewport_change() {
    let mut scene = Scene::new(no_ssao());
    scene.pass_names();
    let back = scene.provider.cad_geometry().targets().unwrap().back;
    assert_eq!(scene.device.resizes_of(back), 0);

    scene.device.set_viewport_size(64, 48);
    scene.pass_names();
    scene.pass_names();
    assert_eq!(scene.device.resizes_of(back), 1);
    let descriptor = scene.device.target(back).unwrap();
    assert_eq!((descriptor.width, descriptor.height), (64, 48));
}

#[test]
fn test_replacing_textured_variant_releases_old_texture() {
    let mut scene = Scene::new(no_ssao());
    let key = TextureKey::Sector {
        model: MODEL,
        sector: 7,
    };
    scene
        .materials
        .add_textured_variant(&mut scene.device, MODEL, 7, &image::RgbaImage::new(2, 2))
        .unwrap();
    scene
        .materials
        .add_textured_variant(&mut scene.device, MODEL, 7, &image::RgbaImage::new(4, 4))
        .unwrap();

    assert_eq!(scene.device.texture_releases_of(key), 1);
    assert!(scene.device.has_texture(key));
    let variant = scene.materials.textured_variant(MODEL, 7).unwrap().unwrap();
    assert_eq!(
        variant.parameter("texture_size"),
        Some(&UniformValue::Vec2(Vec2::new(4.0, 4.0)))
    );
    assert_eq!(variant.texture(), Some(key));
}

#[test]
fn test_unknown_model_errors_name_the_handle() {
    let mut device = TraceDevice::new(8, 8);
    let mut materials = ModelMaterialRegistry::default();
    let mut points = PointCloudMaterialRegistry::new();
    let missing = ModelHandle::from_raw(77);

    let messages = [
        materials.style_index(missing).unwrap_err().to_string(),
        materials.style_index_mut(missing).unwrap_err().to_string(),
        materials.transform_index(missing).unwrap_err().to_string(),
        materials.transform_index_mut(missing).unwrap_err().to_string(),
        materials.material_set(missing).unwrap_err().to_string(),
        materials.object_count(missing).unwrap_err().to_string(),
        materials.clip_planes(missing).unwrap_err().to_string(),
        materials.set_clip_planes(missing, Vec::new()).unwrap_err().to_string(),
        materials.textured_variant(missing, 0).unwrap_err().to_string(),
        materials
            .deregister_model(&mut device, missing)
            .unwrap_err()
            .to_string(),
        points.material(missing).unwrap_err().to_string(),
        points
            .add_node(&mut device, missing, 0, &[0; 16], 1)
            .unwrap_err()
            .to_string(),
        points
            .deregister_model(&mut device, missing)
            .unwrap_err()
            .to_string(),
    ];
    for message in messages {
        assert!(message.contains("#77"), "{message}");
    }
    assert!(matches!(
        materials.style_index(missing),
        Err(StrataError::UnknownModel(handle)) if handle == missing
    ));
}

#[test]
fn test_instance_counts_follow_sector_changes() {
    let mut batcher = GeometryBatcher::new(MODEL);
    batcher.submit(1, &[boxes(0..10)]).unwrap();
    batcher.submit(2, &[boxes(10..30)]).unwrap();
    let key = DrawObjectKey {
        category: GeometryCategory::Box,
        batch_key: 0,
    };
    assert_eq!(batcher.draw_object(key.category, 0).unwrap().instance_count(), 30);

    assert!(batcher.remove(1));
    let object = batcher.draw_object(key.category, 0).unwrap();
    assert_eq!(object.instance_count(), 20);
    assert_eq!(object.instances_of(3), 0);
    assert_eq!(object.instances_of(15), 1);
}

#[test]
fn test_fatal_draw_restores_device_state() {
    let mut scene = Scene::new(no_ssao());
    scene.batchers[0].submit(0, &[boxes(0..8)]).unwrap();
    scene
        .device
        .fail_program(Program::Primitive(GeometryCategory::Box), InjectedFailure::Fatal);
    let before = scene.device.state();

    let err = scene.render().unwrap_err();
    assert!(matches!(err, RenderError::DrawFailed(_)));
    assert_eq!(scene.device.state(), before);
}

#[test]
fn test_transient_failure_skips_only_that_pass() {
    let mut scene = Scene::new(RenderOptions::default());
    scene.batchers[0].submit(0, &[boxes(0..8)]).unwrap();
    scene
        .device
        .fail_program(Program::Ssao, InjectedFailure::Transient);
    let before = scene.device.state();

    let ran = scene.render().unwrap();
    assert_eq!(ran, 4);
    assert_eq!(scene.device.state(), before);
    assert_eq!(scene.device.draws_of(Program::Ssao), 0);
    assert_eq!(scene.device.draws_of(Program::Fxaa), 1);
    assert_eq!(
        scene.device.draws_of(Program::Primitive(GeometryCategory::Box)),
        1
    );
}
