//! Backend abstraction.
//!
//! A [`GlBackend`] owns the device objects and receives every state
//! change and draw call the resource layer issues. [`DummyBackend`]
//! records calls for tests; the `gl-backend` feature adds a real
//! OpenGL implementation on top of `glow`.

use std::any::Any;

use crate::error::GraphicsError;
use crate::types::{
    AttributeType, BufferTarget, BufferUsage, ComponentType, DrawMode, IndexElementType,
    UniformLocation, UniformType, UniformValue,
};

pub mod dummy;
#[cfg(feature = "gl-backend")]
pub mod gl;

pub use dummy::DummyBackend;
#[cfg(feature = "gl-backend")]
pub use gl::GlowBackend;

/// Opaque device buffer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Opaque vertex array object handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexArrayHandle(pub u64);

/// Opaque linked program handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u64);

/// A vertex attribute reported by program reflection. Names are the
/// shader's own; prefix stripping happens in the resource layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedAttribute {
    pub name: String,
    pub location: u32,
    pub ty: AttributeType,
}

/// A uniform reported by program reflection. Array uniforms are
/// reported under their first-element name (`weights[0]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedUniform {
    pub name: String,
    pub location: UniformLocation,
    pub ty: UniformType,
}

/// Result of a successful compile-and-link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedProgram {
    pub handle: ProgramHandle,
    pub attributes: Vec<ReflectedAttribute>,
    pub uniforms: Vec<ReflectedUniform>,
}

/// Device interface the resource layer drives.
///
/// Calls follow GL semantics: attribute pointers capture the buffer
/// currently bound to [`BufferTarget::Array`], element-array bindings
/// are captured by the bound vertex array object, and `byte_offset`
/// arguments on indexed draws are offsets into the index buffer.
pub trait GlBackend {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Downcast support for tests.
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn create_buffer(&mut self) -> BufferHandle;
    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferHandle>);
    fn buffer_data(
        &mut self,
        target: BufferTarget,
        buffer: BufferHandle,
        data: &[u8],
        usage: BufferUsage,
    );
    fn delete_buffer(&mut self, buffer: BufferHandle);

    fn create_vertex_array(&mut self) -> Result<VertexArrayHandle, GraphicsError>;
    fn bind_vertex_array(&mut self, vao: Option<VertexArrayHandle>);
    fn delete_vertex_array(&mut self, vao: VertexArrayHandle);

    fn enable_vertex_attribute(&mut self, location: u32);
    #[allow(clippy::too_many_arguments)]
    fn vertex_attribute_pointer(
        &mut self,
        location: u32,
        size: u32,
        ty: ComponentType,
        normalized: bool,
        stride: u32,
        offset: u32,
    );
    fn vertex_attribute_divisor(&mut self, location: u32, divisor: u32);

    /// Compile both stages, link, and reflect the result. On failure no
    /// program handle is produced and previously linked programs are
    /// untouched.
    fn link_program(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
        feedback_varyings: Option<&[String]>,
    ) -> Result<LinkedProgram, GraphicsError>;
    fn use_program(&mut self, program: Option<ProgramHandle>);
    fn delete_program(&mut self, program: ProgramHandle);
    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue);

    fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32);
    fn draw_elements(
        &mut self,
        mode: DrawMode,
        count: u32,
        element_type: IndexElementType,
        byte_offset: u32,
    );
    fn draw_arrays_instanced(&mut self, mode: DrawMode, first: u32, count: u32, instances: u32);
    fn draw_elements_instanced(
        &mut self,
        mode: DrawMode,
        count: u32,
        element_type: IndexElementType,
        byte_offset: u32,
        instances: u32,
    );

    fn bind_feedback_buffer(&mut self, index: u32, buffer: Option<BufferHandle>);
    fn begin_transform_feedback(&mut self, mode: DrawMode);
    fn end_transform_feedback(&mut self);
    fn set_rasterizer_discard(&mut self, enabled: bool);
}
