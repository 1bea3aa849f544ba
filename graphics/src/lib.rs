//! # Glint Graphics
//!
//! GPU resource and draw-dispatch layer of the Glint engine.
//!
//! The crate is organized around a small cast:
//!
//! - [`Context`] owns a [`backend::GlBackend`] plus the client-side
//!   binding caches,
//! - [`DataBuffer`] / [`IndexBuffer`] pair CPU-side data with lazily
//!   created device buffers,
//! - [`Program`] compiles, links and reflects shader pairs and
//!   dispatches typed uniform uploads,
//! - [`VertexArray`] composes buffers into drawable geometry, picks
//!   the draw strategy, drives transform feedback and answers ray
//!   picking queries,
//! - [`GeometryRegistry`] stores vertex arrays by name.
//!
//! Everything runs unchanged against the recording
//! [`backend::DummyBackend`], which is how the test suite verifies
//! issued command streams without a device.

pub mod backend;
pub mod context;
pub mod error;
pub mod program;
pub mod registry;
pub mod resources;
pub mod types;
pub mod vertex_array;

pub use backend::{BufferHandle, GlBackend, ProgramHandle, VertexArrayHandle};
pub use context::{Context, ContextId, ProgramBinding, ResourceStats};
pub use error::GraphicsError;
pub use program::{Program, ProgramDescriptor};
pub use registry::GeometryRegistry;
pub use resources::{BufferDescriptor, DataBuffer, IndexBuffer};
pub use types::{
    AttributeData, AttributeInfo, AttributeType, BufferTarget, BufferUsage, ComponentType,
    DrawMode, DrawRange, IndexElementType, Indices, UniformInfo, UniformLocation, UniformType,
    UniformValue, INSTANCE_ATTRIBUTE, POSITION_ATTRIBUTE,
};
pub use vertex_array::{VertexArray, VertexArrayDescriptor};

pub use glint_core;

static_assertions::assert_impl_all!(DataBuffer: Send, Sync);
static_assertions::assert_impl_all!(IndexBuffer: Send, Sync);
static_assertions::assert_impl_all!(Program: Send, Sync);
static_assertions::assert_impl_all!(VertexArray: Send, Sync);
static_assertions::assert_impl_all!(GraphicsError: Send, Sync);
