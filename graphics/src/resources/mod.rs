//! Device-backed geometry resources.

pub mod buffer;
pub mod index_buffer;

pub use buffer::{BufferDescriptor, DataBuffer};
pub use index_buffer::IndexBuffer;
