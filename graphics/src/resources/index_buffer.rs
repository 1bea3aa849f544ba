//! Element index buffers.
//!
//! Element width is fixed at construction. [`Indices::Auto`] picks the
//! narrowest width that can represent the largest index value, so a
//! sequence topping out at 255 uploads as bytes and one topping out at
//! 70000 as u32.

use crate::backend::BufferHandle;
use crate::context::{Context, ContextId};
use crate::error::GraphicsError;
use crate::types::{BufferTarget, BufferUsage, IndexElementType, Indices};

#[derive(Debug, Clone)]
enum IndexData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
}

/// A device index buffer with a CPU-side copy for picking queries.
#[derive(Debug)]
pub struct IndexBuffer {
    data: IndexData,
    element_type: IndexElementType,
    handle: Option<BufferHandle>,
    owner: Option<ContextId>,
    disposed: bool,
}

impl IndexBuffer {
    pub fn new(indices: Indices) -> Self {
        let data = match indices {
            Indices::U8(v) => IndexData::U8(v),
            Indices::U16(v) => IndexData::U16(v),
            Indices::U32(v) => IndexData::U32(v),
            Indices::Auto(v) => match v.iter().max().copied().unwrap_or(0) {
                0..=0xFF => IndexData::U8(v.into_iter().map(|i| i as u8).collect()),
                0x100..=0xFFFF => IndexData::U16(v.into_iter().map(|i| i as u16).collect()),
                _ => IndexData::U32(v),
            },
        };
        let element_type = match data {
            IndexData::U8(_) => IndexElementType::U8,
            IndexData::U16(_) => IndexElementType::U16,
            IndexData::U32(_) => IndexElementType::U32,
        };
        Self {
            data,
            element_type,
            handle: None,
            owner: None,
            disposed: false,
        }
    }

    pub fn element_type(&self) -> IndexElementType {
        self.element_type
    }

    /// Bytes per index element.
    pub fn element_size(&self) -> u32 {
        self.element_type.byte_size()
    }

    /// Number of indices.
    pub fn count(&self) -> u32 {
        match &self.data {
            IndexData::U8(v) => v.len() as u32,
            IndexData::U16(v) => v.len() as u32,
            IndexData::U32(v) => v.len() as u32,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Index value at `i`, widened to u32.
    pub fn get(&self, i: usize) -> u32 {
        match &self.data {
            IndexData::U8(v) => v[i] as u32,
            IndexData::U16(v) => v[i] as u32,
            IndexData::U32(v) => v[i],
        }
    }

    pub fn handle(&self) -> Option<BufferHandle> {
        self.handle
    }

    fn bytes(&self) -> &[u8] {
        match &self.data {
            IndexData::U8(v) => v,
            IndexData::U16(v) => bytemuck::cast_slice(v),
            IndexData::U32(v) => bytemuck::cast_slice(v),
        }
    }

    /// Upload to the device. Must run while the owning vertex array is
    /// bound, so the element-array binding lands in its state.
    pub fn upload(&mut self, ctx: &mut Context) -> Result<(), GraphicsError> {
        assert!(!self.disposed, "index buffer used after dispose");
        ctx.check_owner(self.owner, "index buffer")?;
        self.owner = Some(ctx.id());
        let handle = match self.handle {
            Some(handle) => handle,
            None => {
                let handle = ctx.backend_mut().create_buffer();
                ctx.note_buffer_created();
                self.handle = Some(handle);
                handle
            }
        };
        ctx.backend_mut().buffer_data(
            BufferTarget::ElementArray,
            handle,
            self.bytes(),
            BufferUsage::Static,
        );
        Ok(())
    }

    /// Release the device buffer. Safe to call more than once.
    pub fn dispose(&mut self, ctx: &mut Context) {
        if self.disposed {
            return;
        }
        if let Some(handle) = self.handle.take() {
            ctx.backend_mut().delete_buffer(handle);
            ctx.note_buffer_destroyed();
        }
        self.disposed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::Command;

    #[test]
    fn auto_width_follows_largest_value() {
        let cases = [
            (vec![0, 1, 255], IndexElementType::U8),
            (vec![0, 1, 256], IndexElementType::U16),
            (vec![0, 1, 65535], IndexElementType::U16),
            (vec![0, 1, 65536], IndexElementType::U32),
        ];
        for (indices, expected) in cases {
            let buffer = IndexBuffer::new(Indices::Auto(indices.clone()));
            assert_eq!(buffer.element_type(), expected, "indices {:?}", indices);
            assert_eq!(buffer.count() as usize, indices.len());
            for (i, &value) in indices.iter().enumerate() {
                assert_eq!(buffer.get(i), value);
            }
        }
    }

    #[test]
    fn explicit_width_is_kept() {
        let buffer = IndexBuffer::new(Indices::U32(vec![0, 1, 2]));
        assert_eq!(buffer.element_type(), IndexElementType::U32);
        assert_eq!(buffer.element_size(), 4);
    }

    #[test]
    fn upload_sends_packed_bytes() {
        let mut ctx = Context::dummy();
        let mut buffer = IndexBuffer::new(Indices::Auto(vec![0, 1, 2, 2, 1, 3]));
        buffer.upload(&mut ctx).unwrap();
        let commands = ctx.dummy_backend().unwrap().commands();
        assert!(matches!(
            commands[1],
            Command::BufferData {
                target: BufferTarget::ElementArray,
                byte_len: 6,
                ..
            }
        ));
    }

    #[test]
    fn dispose_releases_once() {
        let mut ctx = Context::dummy();
        let mut buffer = IndexBuffer::new(Indices::U16(vec![0, 1, 2]));
        buffer.upload(&mut ctx).unwrap();
        buffer.dispose(&mut ctx);
        buffer.dispose(&mut ctx);
        assert_eq!(ctx.stats().live_buffers(), 0);
    }
}
