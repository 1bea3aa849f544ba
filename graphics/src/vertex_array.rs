//! Geometry composition and draw dispatch.
//!
//! A [`VertexArray`] groups named attribute buffers, optional indices
//! and a draw mode behind one object. Device state is created lazily on
//! first bind; attribute pointers are re-bound only when the active
//! program (or its link generation) changes. [`VertexArray::draw`]
//! selects the dispatch strategy from the composition: instanced if a
//! per-instance transform buffer is present, indexed if indices exist,
//! plain array draws otherwise, with optional sub-range lists.
//!
//! The CPU-side copies of position and index data stay available for
//! ray picking through [`VertexArray::intersect`].

use std::collections::HashMap;
use std::sync::Arc;

use glint_core::{ray_triangle, BoundingBox, HitFilter, Ray, RayHit, Vec3};

use crate::backend::VertexArrayHandle;
use crate::context::{Context, ContextId};
use crate::error::GraphicsError;
use crate::resources::{BufferDescriptor, DataBuffer, IndexBuffer};
use crate::types::{
    AttributeData, BufferTarget, DrawMode, DrawRange, Indices, INSTANCE_ATTRIBUTE,
    POSITION_ATTRIBUTE,
};

/// Construction parameters for a [`VertexArray`].
///
/// Buffer insertion order is preserved; re-adding a name replaces its
/// data. Two buffers built from the same `Arc` allocation will share
/// one device buffer.
#[derive(Debug, Clone, Default)]
pub struct VertexArrayDescriptor {
    buffers: Vec<(String, AttributeData)>,
    indices: Option<Indices>,
    mode: DrawMode,
    ranges: Option<Vec<DrawRange>>,
}

impl VertexArrayDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the vertex position buffer (flat `x, y, z` floats).
    pub fn with_position(self, data: impl Into<AttributeData>) -> Self {
        self.with_buffer(POSITION_ATTRIBUTE, data)
    }

    /// Add per-instance mat4 transforms, switching draws to instanced
    /// dispatch.
    pub fn with_instance_transforms(self, data: impl Into<AttributeData>) -> Self {
        self.with_buffer(INSTANCE_ATTRIBUTE, data)
    }

    pub fn with_buffer(mut self, name: impl Into<String>, data: impl Into<AttributeData>) -> Self {
        let name = name.into();
        let data = data.into();
        match self.buffers.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = data,
            None => self.buffers.push((name, data)),
        }
        self
    }

    pub fn with_indices(mut self, indices: Indices) -> Self {
        self.indices = Some(indices);
        self
    }

    pub fn with_mode(mut self, mode: DrawMode) -> Self {
        self.mode = mode;
        self
    }

    /// Restrict non-instanced draws to these sub-ranges.
    pub fn with_ranges(mut self, ranges: Vec<DrawRange>) -> Self {
        self.ranges = Some(ranges);
        self
    }
}

pub struct VertexArray {
    mode: DrawMode,
    ranges: Option<Vec<DrawRange>>,
    /// CPU-side composition, consumed by the first bind.
    pending_buffers: Vec<(String, AttributeData)>,
    pending_indices: Option<Indices>,
    buffers: HashMap<String, DataBuffer>,
    buffer_order: Vec<String>,
    index_buffer: Option<IndexBuffer>,
    vao: Option<VertexArrayHandle>,
    owner: Option<ContextId>,
    /// Program instance and link generation the attribute pointers were
    /// last bound for.
    bound_program: Option<(u64, u64)>,
    bounds: BoundingBox,
    disposed: bool,
}

impl VertexArray {
    pub fn new(descriptor: VertexArrayDescriptor) -> Self {
        let bounds = descriptor
            .buffers
            .iter()
            .find(|(name, _)| name == POSITION_ATTRIBUTE)
            .map(|(_, data)| BoundingBox::from_points(data.data()))
            .unwrap_or_default();
        Self {
            mode: descriptor.mode,
            ranges: descriptor.ranges,
            pending_buffers: descriptor.buffers,
            pending_indices: descriptor.indices,
            buffers: HashMap::new(),
            buffer_order: Vec::new(),
            index_buffer: None,
            vao: None,
            owner: None,
            bound_program: None,
            bounds: BoundingBox::empty(),
            disposed: false,
        }
        .with_bounds(bounds)
    }

    fn with_bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn mode(&self) -> DrawMode {
        self.mode
    }

    /// Box of the last-set position data.
    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounds
    }

    pub fn is_initialized(&self) -> bool {
        self.vao.is_some()
    }

    pub fn index_buffer(&self) -> Option<&IndexBuffer> {
        self.index_buffer.as_ref()
    }

    /// Vertices in the position buffer.
    pub fn vertex_count(&self) -> u32 {
        if let Some(buffer) = self.buffers.get(POSITION_ATTRIBUTE) {
            return buffer.count();
        }
        self.pending_position()
            .map(|(data, size)| (data.len() / size) as u32)
            .unwrap_or(0)
    }

    /// Instances in the per-instance transform buffer.
    pub fn instance_count(&self) -> u32 {
        if let Some(buffer) = self.buffers.get(INSTANCE_ATTRIBUTE) {
            return buffer.instance_count();
        }
        self.pending_buffers
            .iter()
            .find(|(name, _)| name == INSTANCE_ATTRIBUTE)
            .map(|(_, data)| (data.data().len() / 16) as u32)
            .unwrap_or(0)
    }

    fn pending_position(&self) -> Option<(&[f32], usize)> {
        self.pending_buffers
            .iter()
            .find(|(name, _)| name == POSITION_ATTRIBUTE)
            .map(|(_, data)| {
                let size = match data {
                    AttributeData::Described { size: Some(s), .. } if *s > 0 => *s as usize,
                    _ => 3,
                };
                (data.data().as_ref(), size)
            })
    }

    fn position_data(&self) -> Option<(&[f32], usize)> {
        if let Some(buffer) = self.buffers.get(POSITION_ATTRIBUTE) {
            let size = buffer.size().filter(|s| *s > 0).unwrap_or(3) as usize;
            return Some((buffer.data().as_ref(), size));
        }
        self.pending_position()
    }

    /// Create the device vertex array and upload every pending buffer.
    /// Buffers sharing an allocation are uploaded once and alias the
    /// same device buffer.
    fn init(&mut self, ctx: &mut Context) -> Result<(), GraphicsError> {
        let vao = ctx.backend_mut().create_vertex_array()?;
        ctx.note_vertex_array_created();
        self.vao = Some(vao);
        ctx.bind_vertex_array(vao);

        // Element-array binding is captured by the bound vertex array.
        if let Some(indices) = self.pending_indices.take() {
            let mut index_buffer = IndexBuffer::new(indices);
            index_buffer.upload(ctx)?;
            self.index_buffer = Some(index_buffer);
        }

        let mut shared = HashMap::new();
        for (name, data) in std::mem::take(&mut self.pending_buffers) {
            let key = data.data().as_ptr() as usize;
            let descriptor = BufferDescriptor::from_attribute_data(&name, &data);
            let buffer = match shared.get(&key) {
                Some(&handle) => DataBuffer::with_shared_handle(descriptor, handle),
                None => {
                    let mut buffer = DataBuffer::new(descriptor);
                    buffer.upload(ctx)?;
                    let handle = buffer.handle().ok_or_else(|| {
                        GraphicsError::Internal("upload produced no buffer handle".to_string())
                    })?;
                    shared.insert(key, handle);
                    buffer
                }
            };
            self.buffer_order.push(name.clone());
            self.buffers.insert(name, buffer);
        }

        ctx.unbind_vertex_array();
        ctx.backend_mut().bind_buffer(BufferTarget::Array, None);
        log::trace!(
            "vertex array {:?} initialized: {} buffers, {} indices",
            vao,
            self.buffer_order.len(),
            self.index_buffer.as_ref().map(|ib| ib.count()).unwrap_or(0)
        );
        Ok(())
    }

    /// Bind for drawing, initializing device state on first use.
    ///
    /// Without an active program this only initializes; attribute
    /// pointers are (re-)bound when the active program or its link
    /// generation differs from the last bind.
    pub fn bind(&mut self, ctx: &mut Context) -> Result<(), GraphicsError> {
        assert!(!self.disposed, "vertex array used after dispose");
        ctx.check_owner(self.owner, "vertex array")?;
        self.owner = Some(ctx.id());
        if self.vao.is_none() {
            self.init(ctx)?;
        }
        let Some(binding) = ctx.active_program().cloned() else {
            return Ok(());
        };
        if let Some(vao) = self.vao {
            ctx.bind_vertex_array(vao);
        }
        let key = (binding.instance, binding.generation);
        if self.bound_program != Some(key) {
            for name in &self.buffer_order {
                if let Some(attribute) = binding.attribute(name) {
                    if let Some(buffer) = self.buffers.get_mut(name) {
                        buffer.bind_attribute(ctx, attribute)?;
                    }
                }
            }
            ctx.backend_mut().bind_buffer(BufferTarget::Array, None);
            self.bound_program = Some(key);
        }
        Ok(())
    }

    /// Draw the whole composition. See [`VertexArray::draw_range`].
    pub fn draw(&mut self, ctx: &mut Context) -> Result<(), GraphicsError> {
        self.draw_range(ctx, 0, None)
    }

    /// Draw with an explicit start and count.
    ///
    /// Strategy, in priority order: instanced (indexed or not) when an
    /// instance buffer is present, then indexed, then plain arrays.
    /// For indexed draws `first` is a byte offset into the index
    /// buffer; otherwise it is the first vertex. Sub-range lists
    /// override `first`/`count` on non-instanced draws, with indexed
    /// range offsets scaled by the element size. Anything that resolves
    /// to zero elements issues no backend call.
    pub fn draw_range(
        &mut self,
        ctx: &mut Context,
        first: u32,
        count: Option<u32>,
    ) -> Result<(), GraphicsError> {
        self.bind(ctx)?;
        if ctx.active_program().is_none() {
            return Ok(());
        }

        let mode = self.mode;
        let instances = self
            .buffers
            .get(INSTANCE_ATTRIBUTE)
            .map(|b| b.instance_count())
            .unwrap_or(0);
        let position_count = self
            .buffers
            .get(POSITION_ATTRIBUTE)
            .map(|b| b.count())
            .unwrap_or(0);

        if self.buffers.contains_key(INSTANCE_ATTRIBUTE) {
            if let Some(index_buffer) = &self.index_buffer {
                if index_buffer.count() > 0 && instances > 0 {
                    ctx.backend_mut().draw_elements_instanced(
                        mode,
                        index_buffer.count(),
                        index_buffer.element_type(),
                        first,
                        instances,
                    );
                }
            } else {
                let vertex_count = count.unwrap_or(position_count);
                if vertex_count > 0 && instances > 0 {
                    ctx.backend_mut()
                        .draw_arrays_instanced(mode, first, vertex_count, instances);
                }
            }
        } else if let Some(index_buffer) = &self.index_buffer {
            let element_type = index_buffer.element_type();
            let element_size = index_buffer.element_size();
            match &self.ranges {
                Some(ranges) => {
                    for range in ranges {
                        if range.count > 0 {
                            ctx.backend_mut().draw_elements(
                                mode,
                                range.count,
                                element_type,
                                range.offset * element_size,
                            );
                        }
                    }
                }
                None => {
                    let element_count = count.unwrap_or_else(|| index_buffer.count());
                    if element_count > 0 {
                        ctx.backend_mut()
                            .draw_elements(mode, element_count, element_type, first);
                    }
                }
            }
        } else {
            match &self.ranges {
                Some(ranges) => {
                    for range in ranges {
                        if range.count > 0 {
                            ctx.backend_mut().draw_arrays(mode, range.offset, range.count);
                        }
                    }
                }
                None => {
                    let vertex_count = count.unwrap_or(position_count);
                    if vertex_count > 0 {
                        ctx.backend_mut().draw_arrays(mode, first, vertex_count);
                    }
                }
            }
        }
        Ok(())
    }

    /// Bind the position buffer as transform feedback output slot zero.
    pub fn bind_feedback(&mut self, ctx: &mut Context) -> Result<(), GraphicsError> {
        assert!(!self.disposed, "vertex array used after dispose");
        ctx.check_owner(self.owner, "vertex array")?;
        self.owner = Some(ctx.id());
        if self.vao.is_none() {
            self.init(ctx)?;
        }
        let Some(buffer) = self.buffers.get(POSITION_ATTRIBUTE) else {
            return Err(GraphicsError::InvalidParameter(
                "transform feedback needs a position buffer".to_string(),
            ));
        };
        let handle = buffer.handle();
        ctx.backend_mut().bind_feedback_buffer(0, handle);
        Ok(())
    }

    /// Draw into the active transform feedback instead of the screen.
    ///
    /// Wraps [`VertexArray::draw_range`] in rasterizer discard and a
    /// begin/end feedback bracket; both are restored even when the draw
    /// fails. Ownership is checked before any device state is touched.
    pub fn draw_feedback(
        &mut self,
        ctx: &mut Context,
        first: u32,
        count: Option<u32>,
    ) -> Result<(), GraphicsError> {
        assert!(!self.disposed, "vertex array used after dispose");
        self.bind(ctx)?;
        let mode = self.mode;
        ctx.backend_mut().set_rasterizer_discard(true);
        ctx.backend_mut().begin_transform_feedback(mode);
        let result = self.draw_range(ctx, first, count);
        ctx.backend_mut().end_transform_feedback();
        ctx.backend_mut().set_rasterizer_discard(false);
        result
    }

    /// Replace the position data, updating the bounding box and the
    /// derived vertex count.
    pub fn set_position(
        &mut self,
        ctx: &mut Context,
        data: impl Into<Arc<[f32]>>,
    ) -> Result<(), GraphicsError> {
        self.set_buffer_data(ctx, POSITION_ATTRIBUTE, data)
    }

    /// Replace one buffer's data, creating the buffer if it is new.
    ///
    /// Before device initialization this only updates the CPU-side
    /// composition; an existing entry keeps its declared layout.
    pub fn set_buffer_data(
        &mut self,
        ctx: &mut Context,
        name: &str,
        data: impl Into<Arc<[f32]>>,
    ) -> Result<(), GraphicsError> {
        assert!(!self.disposed, "vertex array used after dispose");
        let data: Arc<[f32]> = data.into();
        if name == POSITION_ATTRIBUTE {
            self.bounds.set_from_points(&data);
        }

        if self.vao.is_none() {
            match self.pending_buffers.iter_mut().find(|(n, _)| n == name) {
                Some((_, existing)) => {
                    *existing = match existing {
                        AttributeData::Raw(_) => AttributeData::Raw(data),
                        AttributeData::Described {
                            size,
                            stride,
                            offset,
                            usage,
                            ..
                        } => AttributeData::Described {
                            data,
                            size: *size,
                            stride: *stride,
                            offset: *offset,
                            usage: *usage,
                        },
                    };
                }
                None => self
                    .pending_buffers
                    .push((name.to_string(), AttributeData::Raw(data))),
            }
            return Ok(());
        }

        ctx.check_owner(self.owner, "vertex array")?;
        match self.buffers.get_mut(name) {
            Some(buffer) => buffer.bind_data(ctx, data)?,
            None => {
                let mut buffer = DataBuffer::new(BufferDescriptor::new(name, data));
                buffer.upload(ctx)?;
                self.buffer_order.push(name.to_string());
                self.buffers.insert(name.to_string(), buffer);
                // The new attribute must be pointed at on the next bind.
                self.bound_program = None;
            }
        }
        Ok(())
    }

    /// Nearest ray intersection against the CPU-side triangle data,
    /// accepting hits on both sides of the origin.
    pub fn intersect(&self, origin: Vec3, direction: Vec3) -> Option<RayHit> {
        self.intersect_with(origin, direction, HitFilter::default())
    }

    /// Nearest ray intersection with an explicit hit filter.
    ///
    /// Works before and after device initialization; triangles come
    /// from the index list when one exists, else from consecutive
    /// position triples. Non-triangle modes yield no hits only if the
    /// position data runs out; the query does not consult the mode.
    pub fn intersect_with(
        &self,
        origin: Vec3,
        direction: Vec3,
        filter: HitFilter,
    ) -> Option<RayHit> {
        assert!(!self.disposed, "vertex array used after dispose");
        let (positions, size) = self.position_data()?;
        let ray = Ray::new(origin, direction);

        let vertex = |index: u32| -> Option<Vec3> {
            let base = index as usize * size;
            let p = positions.get(base..base + 3)?;
            Some(Vec3::new(p[0], p[1], p[2]))
        };
        let mut best: Option<f32> = None;
        let mut test = |i0: u32, i1: u32, i2: u32| {
            let (Some(v0), Some(v1), Some(v2)) = (vertex(i0), vertex(i1), vertex(i2)) else {
                return;
            };
            if let Some(t) = ray_triangle(&ray, v0, v1, v2) {
                if filter.accepts(t) && best.map(|b| t < b).unwrap_or(true) {
                    best = Some(t);
                }
            }
        };

        if let Some(index_buffer) = &self.index_buffer {
            let n = index_buffer.count() as usize;
            for i in (0..n.saturating_sub(2)).step_by(3) {
                test(
                    index_buffer.get(i),
                    index_buffer.get(i + 1),
                    index_buffer.get(i + 2),
                );
            }
        } else if let Some(indices) = &self.pending_indices {
            let n = indices.len();
            for i in (0..n.saturating_sub(2)).step_by(3) {
                test(indices.get(i), indices.get(i + 1), indices.get(i + 2));
            }
        } else {
            let vertex_count = positions.len() / size;
            for triangle in 0..vertex_count / 3 {
                let base = (triangle * 3) as u32;
                test(base, base + 1, base + 2);
            }
        }

        best.map(|t| RayHit {
            position: ray.at(t),
            t,
        })
    }

    /// Release every owned device object. Safe to call more than once;
    /// all other operations panic afterwards.
    pub fn dispose(&mut self, ctx: &mut Context) {
        if self.disposed {
            return;
        }
        for buffer in self.buffers.values_mut() {
            buffer.dispose(ctx);
        }
        if let Some(index_buffer) = &mut self.index_buffer {
            index_buffer.dispose(ctx);
        }
        if let Some(vao) = self.vao.take() {
            ctx.forget_vertex_array(vao);
            ctx.backend_mut().delete_vertex_array(vao);
            ctx.note_vertex_array_destroyed();
        }
        self.buffers.clear();
        self.buffer_order.clear();
        self.index_buffer = None;
        self.pending_buffers.clear();
        self.pending_indices = None;
        self.disposed = true;
    }
}
