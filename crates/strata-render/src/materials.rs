//! Per-model shader parameter sets.
//!
//! Every registered CAD model owns a [`StyleOverrideIndex`], a
//! [`TransformOverrideIndex`] and one [`Material`] per [`GeometryCategory`].
//! Materials reference the model's lookup buffers by key and carry the merged
//! global and model clip planes.

use std::collections::BTreeMap;
use std::mem;
use std::time::{Duration, Instant};

use glam::{Mat4, Vec2, Vec3, Vec4};
use strata_core::{
    merge_clip_planes, ClipPlane, ClipPlaneUniforms, ModelHandle, Result, SectorId, StrataError,
    StyleOverrideIndex, Throttle, TransformOverrideIndex,
};

use crate::category::GeometryCategory;
use crate::device::{Binding, BufferKey, GraphicsDevice, TextureKey};
use crate::error::RenderResult;

/// What the geometry shaders output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderMode {
    #[default]
    Color,
    Normal,
    TreeIndex,
    PackColorAndNormal,
    Depth,
    Effects,
    Ghost,
    LevelOfDetail,
    DepthBufferOnly,
    GeometryType,
}

impl RenderMode {
    /// Whether draws in this mode write color. Only depth priming does not.
    pub fn writes_color(self) -> bool {
        self != RenderMode::DepthBufferOnly
    }

    /// Value passed to shaders.
    pub fn shader_value(self) -> u32 {
        self as u32
    }
}

/// A named shader parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    F32(f32),
    U32(u32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
    /// A device buffer bound alongside the uniforms.
    Buffer(BufferKey),
}

impl UniformValue {
    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            UniformValue::F32(value) => out.extend_from_slice(&value.to_le_bytes()),
            UniformValue::U32(value) => out.extend_from_slice(&value.to_le_bytes()),
            UniformValue::Vec2(value) => out.extend_from_slice(bytemuck::bytes_of(&value.to_array())),
            UniformValue::Vec3(value) => {
                out.extend_from_slice(bytemuck::bytes_of(&value.extend(0.0).to_array()));
            }
            UniformValue::Vec4(value) => out.extend_from_slice(bytemuck::bytes_of(&value.to_array())),
            UniformValue::Mat4(value) => {
                out.extend_from_slice(bytemuck::bytes_of(&value.to_cols_array()));
            }
            UniformValue::Buffer(_) => {}
        }
    }
}

/// Shader parameters for one geometry category of one model.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    category: GeometryCategory,
    params: BTreeMap<&'static str, UniformValue>,
    render_mode: RenderMode,
    color_write: bool,
    clip_planes: ClipPlaneUniforms,
    texture: Option<TextureKey>,
    version: u64,
}

impl Material {
    /// Creates the material of `category` for `model` with `object_count` objects.
    pub fn new(model: ModelHandle, category: GeometryCategory, object_count: u32) -> Self {
        let mut params = BTreeMap::new();
        params.insert("opacity", UniformValue::F32(1.0));
        params.insert("object_count", UniformValue::U32(object_count));
        params.insert("style_lookup", UniformValue::Buffer(BufferKey::StyleLookup(model)));
        params.insert(
            "transform_lookup",
            UniformValue::Buffer(BufferKey::TransformLookup(model)),
        );
        params.insert(
            "transform_matrices",
            UniformValue::Buffer(BufferKey::TransformMatrices(model)),
        );
        if category.is_textured() {
            params.insert("texture_size", UniformValue::Vec2(Vec2::ZERO));
        }
        Self {
            category,
            params,
            render_mode: RenderMode::Color,
            color_write: true,
            clip_planes: ClipPlaneUniforms::default(),
            texture: None,
            version: 0,
        }
    }

    pub fn category(&self) -> GeometryCategory {
        self.category
    }

    pub fn parameter(&self, name: &str) -> Option<&UniformValue> {
        self.params.get(name)
    }

    /// Sets a known parameter.
    ///
    /// Unknown names and type changes are logged and ignored so a bad
    /// cosmetic parameter never aborts a frame. Returns whether it was set.
    pub fn set_parameter(&mut self, name: &str, value: UniformValue) -> bool {
        match self.params.get_mut(name) {
            Some(current) if mem::discriminant(current) == mem::discriminant(&value) => {
                *current = value;
                self.version += 1;
                true
            }
            Some(current) => {
                log::warn!(
                    "{} material: parameter '{name}' expects {current:?}, got {value:?}",
                    self.category
                );
                false
            }
            None => {
                log::warn!("{} material has no parameter '{name}'", self.category);
                false
            }
        }
    }

    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    pub fn color_write(&self) -> bool {
        self.color_write
    }

    /// Sets the render mode and the paired color-write flag.
    pub fn set_render_mode(&mut self, mode: RenderMode) {
        self.render_mode = mode;
        self.color_write = mode.writes_color();
        self.version += 1;
    }

    pub fn clip_planes(&self) -> &ClipPlaneUniforms {
        &self.clip_planes
    }

    pub fn set_clip_planes(&mut self, planes: &[ClipPlane]) {
        let uniforms = ClipPlaneUniforms::from_planes(planes);
        if uniforms != self.clip_planes {
            self.clip_planes = uniforms;
            self.version += 1;
        }
    }

    pub fn texture(&self) -> Option<TextureKey> {
        self.texture
    }

    /// Bumped on every change; used to detect stale GPU state.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Packed uniform block drawn as `mode`: parameters in name order, then
    /// render mode, then clip planes.
    pub fn uniform_bytes_as(&self, mode: RenderMode) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        for value in self.params.values() {
            value.write_to(&mut out);
        }
        out.extend_from_slice(&mode.shader_value().to_le_bytes());
        out.extend_from_slice(bytemuck::bytes_of(&self.clip_planes));
        out
    }

    /// Buffers and textures the material binds.
    pub fn bindings(&self) -> Vec<Binding> {
        let mut bindings: Vec<Binding> = self
            .params
            .values()
            .filter_map(|value| match value {
                UniformValue::Buffer(key) => Some(Binding::Buffer(*key)),
                _ => None,
            })
            .collect();
        if let Some(texture) = self.texture {
            bindings.push(Binding::Texture(texture));
        }
        bindings
    }

    fn textured_variant(&self, texture: TextureKey, size: Vec2) -> Self {
        let mut variant = self.clone();
        variant.texture = Some(texture);
        variant
            .params
            .insert("texture_size", UniformValue::Vec2(size));
        variant
    }
}

/// All materials of one model.
#[derive(Debug, Clone)]
pub struct MaterialSet {
    model: ModelHandle,
    /// Indexed by `GeometryCategory as usize`.
    materials: Vec<Material>,
    textured: BTreeMap<SectorId, Material>,
}

impl MaterialSet {
    pub fn new(model: ModelHandle, object_count: u32) -> Self {
        Self {
            model,
            materials: GeometryCategory::ALL
                .iter()
                .map(|&category| Material::new(model, category, object_count))
                .collect(),
            textured: BTreeMap::new(),
        }
    }

    pub fn model(&self) -> ModelHandle {
        self.model
    }

    pub fn material(&self, category: GeometryCategory) -> &Material {
        &self.materials[category as usize]
    }

    pub fn material_mut(&mut self, category: GeometryCategory) -> &mut Material {
        &mut self.materials[category as usize]
    }

    /// Material used to draw a draw object. Textured draw objects are keyed by
    /// sector and use that sector's variant when one exists.
    pub fn material_for(&self, category: GeometryCategory, batch_key: u64) -> &Material {
        if category.is_textured() {
            if let Some(variant) = self.textured.get(&batch_key) {
                return variant;
            }
        }
        self.material(category)
    }

    pub fn textured_variant(&self, sector: SectorId) -> Option<&Material> {
        self.textured.get(&sector)
    }

    fn all_mut(&mut self) -> impl Iterator<Item = &mut Material> {
        self.materials.iter_mut().chain(self.textured.values_mut())
    }
}

struct ModelEntry {
    styles: StyleOverrideIndex,
    transforms: TransformOverrideIndex,
    materials: MaterialSet,
    clip_planes: Vec<ClipPlane>,
    merged_clip_planes: Vec<ClipPlane>,
    style_throttle: Throttle,
    /// Style generation already handed to the throttle.
    style_requested: u64,
}

impl ModelEntry {
    fn apply_clip_planes(&mut self, global: &[ClipPlane]) {
        self.merged_clip_planes = merge_clip_planes(global, &self.clip_planes);
        for material in self.materials.all_mut() {
            material.set_clip_planes(&self.merged_clip_planes);
        }
    }

    fn upload_styles(&mut self, handle: ModelHandle, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        self.styles.build();
        device.upload_buffer(BufferKey::StyleLookup(handle), self.styles.records(), None)
    }

    fn upload_transforms(
        &mut self,
        handle: ModelHandle,
        device: &mut dyn GraphicsDevice,
    ) -> RenderResult<()> {
        self.transforms.build();
        if self.transforms.take_reallocated() {
            device.release_buffer(BufferKey::TransformMatrices(handle));
        }
        device.upload_buffer(
            BufferKey::TransformLookup(handle),
            bytemuck::cast_slice(self.transforms.lookup()),
            None,
        )?;
        device.upload_buffer(
            BufferKey::TransformMatrices(handle),
            self.transforms.matrices(),
            None,
        )
    }
}

/// Materials, style and transform state of every loaded CAD model.
pub struct ModelMaterialRegistry {
    models: BTreeMap<ModelHandle, ModelEntry>,
    global_clip_planes: Vec<ClipPlane>,
    render_mode: RenderMode,
    rebuild_interval: Duration,
}

impl ModelMaterialRegistry {
    /// Creates a registry whose style uploads are throttled to one per
    /// `rebuild_interval`.
    pub fn new(rebuild_interval: Duration) -> Self {
        Self {
            models: BTreeMap::new(),
            global_clip_planes: Vec::new(),
            render_mode: RenderMode::Color,
            rebuild_interval,
        }
    }

    /// Registers a model and uploads its initial lookups.
    pub fn register_model(
        &mut self,
        device: &mut dyn GraphicsDevice,
        handle: ModelHandle,
        object_count: u32,
    ) -> RenderResult<()> {
        if self.models.contains_key(&handle) {
            return Err(StrataError::ModelAlreadyRegistered(handle).into());
        }

        let mut materials = MaterialSet::new(handle, object_count);
        for material in materials.all_mut() {
            material.set_render_mode(self.render_mode);
        }
        let mut entry = ModelEntry {
            styles: StyleOverrideIndex::new(object_count),
            transforms: TransformOverrideIndex::new(object_count),
            materials,
            clip_planes: Vec::new(),
            merged_clip_planes: Vec::new(),
            style_throttle: Throttle::new(self.rebuild_interval),
            style_requested: 0,
        };
        entry.apply_clip_planes(&self.global_clip_planes);
        entry.upload_styles(handle, device)?;
        entry.upload_transforms(handle, device)?;
        entry.style_requested = entry.styles.generation();

        self.models.insert(handle, entry);
        log::info!("registered CAD model {handle} with {object_count} objects");
        Ok(())
    }

    /// Releases every device resource of a model.
    pub fn deregister_model(
        &mut self,
        device: &mut dyn GraphicsDevice,
        handle: ModelHandle,
    ) -> RenderResult<()> {
        let entry = self
            .models
            .remove(&handle)
            .ok_or(StrataError::UnknownModel(handle))?;
        device.release_buffer(BufferKey::StyleLookup(handle));
        device.release_buffer(BufferKey::TransformLookup(handle));
        device.release_buffer(BufferKey::TransformMatrices(handle));
        for sector in entry.materials.textured.keys() {
            device.release_texture(TextureKey::Sector {
                model: handle,
                sector: *sector,
            });
        }
        log::info!("deregistered CAD model {handle}");
        Ok(())
    }

    pub fn contains(&self, handle: ModelHandle) -> bool {
        self.models.contains_key(&handle)
    }

    /// Registered handles in ascending order.
    pub fn handles(&self) -> impl Iterator<Item = ModelHandle> + '_ {
        self.models.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn object_count(&self, handle: ModelHandle) -> Result<u32> {
        Ok(self.entry(handle)?.styles.object_count())
    }

    pub fn material_set(&self, handle: ModelHandle) -> Result<&MaterialSet> {
        Ok(&self.entry(handle)?.materials)
    }

    pub fn style_index(&self, handle: ModelHandle) -> Result<&StyleOverrideIndex> {
        Ok(&self.entry(handle)?.styles)
    }

    /// Mutable style access. Changes reach the GPU on a later
    /// [`prepare_frame`](Self::prepare_frame).
    pub fn style_index_mut(&mut self, handle: ModelHandle) -> Result<&mut StyleOverrideIndex> {
        Ok(&mut self.entry_mut(handle)?.styles)
    }

    pub fn transform_index(&self, handle: ModelHandle) -> Result<&TransformOverrideIndex> {
        Ok(&self.entry(handle)?.transforms)
    }

    pub fn transform_index_mut(
        &mut self,
        handle: ModelHandle,
    ) -> Result<&mut TransformOverrideIndex> {
        Ok(&mut self.entry_mut(handle)?.transforms)
    }

    /// Sets a parameter on one category's material of a model.
    pub fn set_material_parameter(
        &mut self,
        handle: ModelHandle,
        category: GeometryCategory,
        name: &str,
        value: UniformValue,
    ) -> Result<bool> {
        let entry = self.entry_mut(handle)?;
        Ok(entry.materials.material_mut(category).set_parameter(name, value))
    }

    /// Replaces a model's own clip planes.
    pub fn set_clip_planes(&mut self, handle: ModelHandle, planes: Vec<ClipPlane>) -> Result<()> {
        let global = &self.global_clip_planes;
        let entry = self
            .models
            .get_mut(&handle)
            .ok_or(StrataError::UnknownModel(handle))?;
        entry.clip_planes = planes;
        entry.apply_clip_planes(global);
        Ok(())
    }

    /// Replaces the clip planes applied to every model.
    pub fn set_global_clip_planes(&mut self, planes: Vec<ClipPlane>) {
        self.global_clip_planes = planes;
        for entry in self.models.values_mut() {
            entry.apply_clip_planes(&self.global_clip_planes);
        }
    }

    pub fn global_clip_planes(&self) -> &[ClipPlane] {
        &self.global_clip_planes
    }

    /// Global planes followed by the model's own.
    pub fn clip_planes(&self, handle: ModelHandle) -> Result<&[ClipPlane]> {
        Ok(&self.entry(handle)?.merged_clip_planes)
    }

    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    /// Applies `mode` to every material of every model.
    pub fn set_render_mode(&mut self, mode: RenderMode) {
        self.render_mode = mode;
        for entry in self.models.values_mut() {
            for material in entry.materials.all_mut() {
                material.set_render_mode(mode);
            }
        }
    }

    /// Binds `image` to a copy of the model's textured material for `sector`.
    ///
    /// An existing variant for the sector is replaced and its texture released
    /// first.
    pub fn add_textured_variant(
        &mut self,
        device: &mut dyn GraphicsDevice,
        handle: ModelHandle,
        sector: SectorId,
        image: &image::RgbaImage,
    ) -> RenderResult<()> {
        let entry = self
            .models
            .get_mut(&handle)
            .ok_or(StrataError::UnknownModel(handle))?;
        let key = TextureKey::Sector {
            model: handle,
            sector,
        };
        if entry.materials.textured.remove(&sector).is_some() {
            device.release_texture(key);
        }
        device.upload_texture(key, image)?;

        let size = Vec2::new(image.width() as f32, image.height() as f32);
        let variant = entry
            .materials
            .material(GeometryCategory::TexturedMesh)
            .textured_variant(key, size);
        entry.materials.textured.insert(sector, variant);
        Ok(())
    }

    pub fn textured_variant(&self, handle: ModelHandle, sector: SectorId) -> Result<Option<&Material>> {
        Ok(self.entry(handle)?.materials.textured_variant(sector))
    }

    /// Drops a sector's textured variant. Returns whether one existed.
    pub fn remove_textured_variant(
        &mut self,
        device: &mut dyn GraphicsDevice,
        handle: ModelHandle,
        sector: SectorId,
    ) -> RenderResult<bool> {
        let entry = self.entry_mut(handle)?;
        if entry.materials.textured.remove(&sector).is_none() {
            return Ok(false);
        }
        device.release_texture(TextureKey::Sector {
            model: handle,
            sector,
        });
        Ok(true)
    }

    pub fn rebuild_interval(&self) -> Duration {
        self.rebuild_interval
    }

    pub fn set_rebuild_interval(&mut self, interval: Duration) {
        self.rebuild_interval = interval;
        for entry in self.models.values_mut() {
            entry.style_throttle.set_interval(interval);
        }
    }

    /// Uploads changed lookups before a frame.
    ///
    /// Transform changes upload immediately. Style changes go through a
    /// leading and trailing edge throttle so bursts of edits collapse into one
    /// rebuild per interval.
    pub fn prepare_frame(&mut self, device: &mut dyn GraphicsDevice, now: Instant) -> RenderResult<()> {
        for (&handle, entry) in &mut self.models {
            let generation = entry.styles.generation();
            let due = if generation == entry.style_requested {
                entry.style_throttle.poll(now)
            } else {
                entry.style_requested = generation;
                entry.style_throttle.request(now)
            };
            if due {
                entry.upload_styles(handle, device)?;
            }
            if entry.transforms.is_dirty() {
                entry.upload_transforms(handle, device)?;
            }
        }
        Ok(())
    }

    /// Uploads every pending change, ignoring the throttle.
    pub fn flush(&mut self, device: &mut dyn GraphicsDevice, now: Instant) -> RenderResult<()> {
        for (&handle, entry) in &mut self.models {
            let generation = entry.styles.generation();
            if generation != entry.style_requested || entry.style_throttle.is_pending() {
                entry.style_requested = generation;
                entry.style_throttle.flush(now);
                entry.upload_styles(handle, device)?;
            }
            if entry.transforms.is_dirty() {
                entry.upload_transforms(handle, device)?;
            }
        }
        Ok(())
    }

    fn entry(&self, handle: ModelHandle) -> Result<&ModelEntry> {
        self.models.get(&handle).ok_or(StrataError::UnknownModel(handle))
    }

    fn entry_mut(&mut self, handle: ModelHandle) -> Result<&mut ModelEntry> {
        self.models
            .get_mut(&handle)
            .ok_or(StrataError::UnknownModel(handle))
    }
}

impl Default for ModelMaterialRegistry {
    fn default() -> Self {
        Self::new(Duration::from_millis(16))
    }
}
