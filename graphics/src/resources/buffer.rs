//! Vertex attribute buffers.
//!
//! A [`DataBuffer`] pairs a CPU-side float array with a lazily created
//! device buffer and the layout needed to point a shader attribute at
//! it. Vertex and instance counts are derived from the data length and
//! kept consistent across re-uploads.

use std::sync::Arc;

use crate::backend::BufferHandle;
use crate::context::{Context, ContextId};
use crate::error::GraphicsError;
use crate::types::{
    AttributeData, AttributeInfo, BufferTarget, BufferUsage, ComponentType, INSTANCE_ATTRIBUTE,
    POSITION_ATTRIBUTE,
};

/// Construction parameters for a [`DataBuffer`].
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub name: String,
    pub data: Arc<[f32]>,
    /// Components per vertex. `None` defers to the size reflected from
    /// the program at attribute-bind time.
    pub size: Option<u32>,
    /// Byte stride between vertices; zero means tightly packed.
    pub stride: u32,
    /// Byte offset of the first component.
    pub offset: u32,
    pub usage: BufferUsage,
    pub component_type: ComponentType,
}

impl BufferDescriptor {
    /// Descriptor with layout defaults for `name`. Position buffers
    /// default to three components; everything else is sized from
    /// shader reflection.
    pub fn new(name: impl Into<String>, data: impl Into<Arc<[f32]>>) -> Self {
        let name = name.into();
        let size = (name == POSITION_ATTRIBUTE).then_some(3);
        Self {
            name,
            data: data.into(),
            size,
            stride: 0,
            offset: 0,
            usage: BufferUsage::default(),
            component_type: ComponentType::default(),
        }
    }

    /// Descriptor from vertex-array attribute data.
    pub(crate) fn from_attribute_data(name: &str, data: &AttributeData) -> Self {
        match data {
            AttributeData::Raw(data) => Self::new(name, data.clone()),
            AttributeData::Described {
                data,
                size,
                stride,
                offset,
                usage,
            } => Self {
                size: size.or((name == POSITION_ATTRIBUTE).then_some(3)),
                stride: *stride,
                offset: *offset,
                usage: *usage,
                ..Self::new(name, data.clone())
            },
        }
    }
}

/// A named vertex buffer with CPU-side data and layout.
#[derive(Debug)]
pub struct DataBuffer {
    name: String,
    usage: BufferUsage,
    size: Option<u32>,
    stride: u32,
    offset: u32,
    component_type: ComponentType,
    data: Arc<[f32]>,
    handle: Option<BufferHandle>,
    /// Whether dispose deletes the device buffer. False for buffers
    /// sharing a deduplicated handle.
    owns_handle: bool,
    count: u32,
    instance_count: u32,
    owner: Option<ContextId>,
    disposed: bool,
}

impl DataBuffer {
    pub fn new(descriptor: BufferDescriptor) -> Self {
        let mut buffer = Self {
            name: descriptor.name,
            usage: descriptor.usage,
            size: descriptor.size,
            stride: descriptor.stride,
            offset: descriptor.offset,
            component_type: descriptor.component_type,
            data: descriptor.data,
            handle: None,
            owns_handle: true,
            count: 0,
            instance_count: 0,
            owner: None,
            disposed: false,
        };
        buffer.recompute_counts();
        buffer
    }

    /// Buffer aliasing an already-uploaded device buffer. Dispose will
    /// not delete the shared handle.
    pub(crate) fn with_shared_handle(descriptor: BufferDescriptor, handle: BufferHandle) -> Self {
        let mut buffer = Self::new(descriptor);
        buffer.handle = Some(handle);
        buffer.owns_handle = false;
        buffer
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The CPU-side copy of the last-uploaded data.
    pub fn data(&self) -> &Arc<[f32]> {
        &self.data
    }

    /// Components per vertex, if fixed at construction.
    pub fn size(&self) -> Option<u32> {
        self.size
    }

    /// Vertices described by the current data, when the layout allows
    /// deriving one.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Instances described by the current data. Non-zero only for the
    /// per-instance transform buffer.
    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    pub fn handle(&self) -> Option<BufferHandle> {
        self.handle
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Stride takes precedence over component size; an instance buffer
    /// holds one mat4 (16 floats) per instance. A stride shorter than
    /// one 4-byte component cannot describe a vertex and is treated as
    /// tightly packed.
    fn recompute_counts(&mut self) {
        let len = self.data.len() as u32;
        self.count = if self.stride >= 4 {
            len / (self.stride / 4)
        } else {
            match self.size {
                Some(size) if size > 0 => len / size,
                _ => 0,
            }
        };
        self.instance_count = if self.name == INSTANCE_ATTRIBUTE {
            len / 16
        } else {
            0
        };
    }

    fn ensure_handle(&mut self, ctx: &mut Context) -> BufferHandle {
        match self.handle {
            Some(handle) => handle,
            None => {
                let handle = ctx.backend_mut().create_buffer();
                ctx.note_buffer_created();
                log::trace!("data buffer '{}' created as {:?}", self.name, handle);
                self.handle = Some(handle);
                handle
            }
        }
    }

    fn capture_owner(&mut self, ctx: &Context) -> Result<(), GraphicsError> {
        ctx.check_owner(self.owner, "data buffer")?;
        self.owner = Some(ctx.id());
        Ok(())
    }

    /// Upload the current CPU-side data to the device buffer, creating
    /// it on first use.
    pub fn upload(&mut self, ctx: &mut Context) -> Result<(), GraphicsError> {
        assert!(!self.disposed, "data buffer '{}' used after dispose", self.name);
        self.capture_owner(ctx)?;
        let handle = self.ensure_handle(ctx);
        ctx.backend_mut().buffer_data(
            BufferTarget::Array,
            handle,
            bytemuck::cast_slice(self.data.as_ref()),
            self.usage,
        );
        Ok(())
    }

    /// Replace the buffer contents. Vertex and instance counts are
    /// recomputed from the new length before upload.
    pub fn bind_data(
        &mut self,
        ctx: &mut Context,
        data: impl Into<Arc<[f32]>>,
    ) -> Result<(), GraphicsError> {
        assert!(!self.disposed, "data buffer '{}' used after dispose", self.name);
        self.data = data.into();
        self.recompute_counts();
        self.upload(ctx)
    }

    /// Point a reflected attribute at this buffer.
    ///
    /// Matrix attributes are split into consecutive vec4 slots, one
    /// location per column. The per-instance transform buffer gets a
    /// divisor of one on every slot it occupies.
    pub fn bind_attribute(
        &mut self,
        ctx: &mut Context,
        attribute: &AttributeInfo,
    ) -> Result<(), GraphicsError> {
        assert!(!self.disposed, "data buffer '{}' used after dispose", self.name);
        self.capture_owner(ctx)?;
        let handle = self.ensure_handle(ctx);
        let instanced = self.name == INSTANCE_ATTRIBUTE;
        let backend = ctx.backend_mut();
        backend.bind_buffer(BufferTarget::Array, Some(handle));
        if attribute.size > 4 {
            let slots = attribute.size / 4;
            for slot in 0..slots {
                let location = attribute.location + slot;
                backend.enable_vertex_attribute(location);
                backend.vertex_attribute_pointer(
                    location,
                    4,
                    ComponentType::F32,
                    false,
                    4 * attribute.size,
                    16 * slot,
                );
                if instanced {
                    backend.vertex_attribute_divisor(location, 1);
                }
            }
        } else {
            let size = self.size.unwrap_or(attribute.size);
            backend.enable_vertex_attribute(attribute.location);
            backend.vertex_attribute_pointer(
                attribute.location,
                size,
                self.component_type,
                false,
                self.stride,
                self.offset,
            );
            if instanced {
                backend.vertex_attribute_divisor(attribute.location, 1);
            }
        }
        Ok(())
    }

    /// Release the device buffer. Safe to call more than once; all
    /// other operations panic afterwards.
    pub fn dispose(&mut self, ctx: &mut Context) {
        if self.disposed {
            return;
        }
        if let Some(handle) = self.handle.take() {
            if self.owns_handle {
                ctx.backend_mut().delete_buffer(handle);
                ctx.note_buffer_destroyed();
            }
        }
        self.disposed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::Command;

    fn positions() -> Vec<f32> {
        vec![0.0; 18] // six xyz vertices
    }

    #[test]
    fn count_from_component_size() {
        let buffer = DataBuffer::new(BufferDescriptor::new(POSITION_ATTRIBUTE, positions()));
        assert_eq!(buffer.count(), 6);
        assert_eq!(buffer.instance_count(), 0);
    }

    #[test]
    fn stride_takes_precedence_over_size() {
        let mut descriptor = BufferDescriptor::new(POSITION_ATTRIBUTE, vec![0.0; 24]);
        descriptor.stride = 24; // xyz + xyz padding per vertex
        let buffer = DataBuffer::new(descriptor);
        assert_eq!(buffer.count(), 4);
    }

    #[test]
    fn sub_component_stride_counts_as_tightly_packed() {
        let mut descriptor = BufferDescriptor::new(POSITION_ATTRIBUTE, positions());
        descriptor.stride = 2;
        let buffer = DataBuffer::new(descriptor);
        assert_eq!(buffer.count(), 6);
    }

    #[test]
    fn instance_buffer_counts_mat4s() {
        let buffer = DataBuffer::new(BufferDescriptor::new(INSTANCE_ATTRIBUTE, vec![0.0; 48]));
        assert_eq!(buffer.instance_count(), 3);
        assert_eq!(buffer.count(), 0);
    }

    #[test]
    fn bind_data_recomputes_counts_and_uploads() {
        let mut ctx = Context::dummy();
        let mut buffer = DataBuffer::new(BufferDescriptor::new(POSITION_ATTRIBUTE, positions()));
        buffer.bind_data(&mut ctx, vec![0.0; 9]).unwrap();
        assert_eq!(buffer.count(), 3);
        let commands = ctx.dummy_backend().unwrap().commands();
        assert!(matches!(commands[0], Command::CreateBuffer(_)));
        assert!(matches!(
            commands[1],
            Command::BufferData { byte_len: 36, .. }
        ));
    }

    #[test]
    fn reupload_reuses_the_device_buffer() {
        let mut ctx = Context::dummy();
        let mut buffer = DataBuffer::new(BufferDescriptor::new(POSITION_ATTRIBUTE, positions()));
        buffer.upload(&mut ctx).unwrap();
        buffer.bind_data(&mut ctx, vec![1.0; 18]).unwrap();
        let creates = ctx
            .dummy_backend()
            .unwrap()
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::CreateBuffer(_)))
            .count();
        assert_eq!(creates, 1);
        assert_eq!(ctx.stats().live_buffers(), 1);
    }

    #[test]
    fn dispose_is_idempotent_and_shared_handles_survive() {
        let mut ctx = Context::dummy();
        let mut owner = DataBuffer::new(BufferDescriptor::new(POSITION_ATTRIBUTE, positions()));
        owner.upload(&mut ctx).unwrap();
        let handle = owner.handle().unwrap();

        let mut alias = DataBuffer::with_shared_handle(
            BufferDescriptor::new("normal", positions()),
            handle,
        );
        alias.dispose(&mut ctx);
        alias.dispose(&mut ctx);
        assert_eq!(ctx.stats().live_buffers(), 1);

        owner.dispose(&mut ctx);
        owner.dispose(&mut ctx);
        assert_eq!(ctx.stats().live_buffers(), 0);
    }

    #[test]
    #[should_panic(expected = "used after dispose")]
    fn upload_after_dispose_panics() {
        let mut ctx = Context::dummy();
        let mut buffer = DataBuffer::new(BufferDescriptor::new(POSITION_ATTRIBUTE, positions()));
        buffer.dispose(&mut ctx);
        let _ = buffer.upload(&mut ctx);
    }
}
