//! Plain data types shared between resources and backends.

use std::sync::Arc;

/// Attribute name carrying vertex positions. Always present on drawable
/// geometry; feeds vertex counts, bounding volumes and picking.
pub const POSITION_ATTRIBUTE: &str = "position";

/// Attribute name carrying per-instance mat4 transforms. Its presence
/// switches a vertex array to instanced dispatch.
pub const INSTANCE_ATTRIBUTE: &str = "offset";

/// Prefix stripped from reflected vertex attribute names, so shader
/// inputs like `a_position` match buffers registered as `position`.
pub const ATTRIBUTE_NAME_PREFIX: &str = "a_";

/// Primitive assembly mode for draw calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrawMode {
    Points,
    Lines,
    LineStrip,
    LineLoop,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

/// Expected update frequency of a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferUsage {
    /// Written once, drawn many times.
    #[default]
    Static,
    /// Rewritten occasionally.
    Dynamic,
    /// Rewritten nearly every frame.
    Stream,
}

/// Device buffer binding point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferTarget {
    /// Vertex attribute data.
    Array,
    /// Index data; the binding is captured by the active vertex array.
    ElementArray,
}

/// Scalar type of attribute components as stored in a vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComponentType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    #[default]
    F32,
}

impl ComponentType {
    /// Size of one component in bytes.
    pub fn byte_size(&self) -> u32 {
        match self {
            ComponentType::I8 | ComponentType::U8 => 1,
            ComponentType::I16 | ComponentType::U16 => 2,
            ComponentType::I32 | ComponentType::U32 | ComponentType::F32 => 4,
        }
    }
}

/// Element width of an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexElementType {
    U8,
    U16,
    U32,
}

impl IndexElementType {
    /// Size of one index element in bytes.
    pub fn byte_size(&self) -> u32 {
        match self {
            IndexElementType::U8 => 1,
            IndexElementType::U16 => 2,
            IndexElementType::U32 => 4,
        }
    }
}

/// A sub-range of a draw, in elements (indexed draws) or vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRange {
    /// First element or vertex of the range.
    pub offset: u32,
    /// Number of elements or vertices; zero-count ranges are skipped.
    pub count: u32,
}

impl DrawRange {
    pub fn new(offset: u32, count: u32) -> Self {
        Self { offset, count }
    }
}

/// Vertex data handed to a vertex array descriptor.
///
/// Data is reference counted; two attributes built from the same `Arc`
/// allocation share a single device buffer.
#[derive(Debug, Clone)]
pub enum AttributeData {
    /// Tightly packed data with layout inferred from the attribute name
    /// and the program's reflected attribute size.
    Raw(Arc<[f32]>),
    /// Data with an explicit layout.
    Described {
        data: Arc<[f32]>,
        /// Components per vertex; `None` defers to shader reflection.
        size: Option<u32>,
        /// Byte stride between vertices; zero means tightly packed.
        stride: u32,
        /// Byte offset of the first component.
        offset: u32,
        usage: BufferUsage,
    },
}

impl AttributeData {
    /// The underlying shared allocation.
    pub fn data(&self) -> &Arc<[f32]> {
        match self {
            AttributeData::Raw(data) => data,
            AttributeData::Described { data, .. } => data,
        }
    }
}

impl From<Vec<f32>> for AttributeData {
    fn from(data: Vec<f32>) -> Self {
        AttributeData::Raw(Arc::from(data))
    }
}

impl From<Arc<[f32]>> for AttributeData {
    fn from(data: Arc<[f32]>) -> Self {
        AttributeData::Raw(data)
    }
}

/// Index data handed to a vertex array descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Indices {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    /// Element width chosen from the largest index value at upload time.
    Auto(Vec<u32>),
}

impl Indices {
    /// Number of indices.
    pub fn len(&self) -> usize {
        match self {
            Indices::U8(v) => v.len(),
            Indices::U16(v) => v.len(),
            Indices::U32(v) | Indices::Auto(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index value at position `i`, widened to u32.
    pub fn get(&self, i: usize) -> u32 {
        match self {
            Indices::U8(v) => v[i] as u32,
            Indices::U16(v) => v[i] as u32,
            Indices::U32(v) | Indices::Auto(v) => v[i],
        }
    }
}

/// GLSL type of a reflected vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    Float,
    FloatVec2,
    FloatVec3,
    FloatVec4,
    FloatMat4,
}

impl AttributeType {
    /// Total float components occupied by one attribute of this type.
    pub fn component_count(&self) -> u32 {
        match self {
            AttributeType::Float => 1,
            AttributeType::FloatVec2 => 2,
            AttributeType::FloatVec3 => 3,
            AttributeType::FloatVec4 => 4,
            AttributeType::FloatMat4 => 16,
        }
    }

    /// Attribute slots (locations) consumed by this type.
    pub fn location_count(&self) -> u32 {
        match self {
            AttributeType::FloatMat4 => 4,
            _ => 1,
        }
    }
}

/// GLSL type of a reflected uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformType {
    Int,
    Bool,
    Sampler2D,
    SamplerCube,
    IntVec2,
    IntVec3,
    IntVec4,
    BoolVec2,
    BoolVec3,
    BoolVec4,
    Float,
    FloatVec2,
    FloatVec3,
    FloatVec4,
    FloatMat2,
    FloatMat3,
    FloatMat4,
}

/// Location of a uniform within a linked program, as issued by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// A vertex attribute of a linked program, keyed by its buffer name
/// (shader name with [`ATTRIBUTE_NAME_PREFIX`] stripped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    /// Buffer-facing name.
    pub name: String,
    /// First attribute location.
    pub location: u32,
    pub ty: AttributeType,
    /// Float components per vertex, from the reflected type.
    pub size: u32,
}

/// A uniform of a linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformInfo {
    pub location: UniformLocation,
    pub ty: UniformType,
    /// Whether the uniform was declared as an array.
    pub array: bool,
}

/// A value to upload through [`crate::Program::bind_uniform`].
///
/// Matrix values are column-major and never transposed on upload.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Int(i32),
    IntVec2([i32; 2]),
    IntVec3([i32; 3]),
    IntVec4([i32; 4]),
    Float(f32),
    /// Contents of a `float[]` uniform array.
    FloatArray(Vec<f32>),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat2([f32; 4]),
    Mat3([f32; 9]),
    Mat4([f32; 16]),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_allocation_has_one_pointer() {
        let data: Arc<[f32]> = Arc::from(vec![1.0, 2.0, 3.0]);
        let a = AttributeData::Raw(data.clone());
        let b = AttributeData::from(data);
        assert_eq!(a.data().as_ptr(), b.data().as_ptr());
    }

    #[test]
    fn index_widening() {
        let indices = Indices::U8(vec![0, 1, 255]);
        assert_eq!(indices.len(), 3);
        assert_eq!(indices.get(2), 255);
    }

    #[test]
    fn mat4_attribute_spans_four_locations() {
        assert_eq!(AttributeType::FloatMat4.component_count(), 16);
        assert_eq!(AttributeType::FloatMat4.location_count(), 4);
        assert_eq!(AttributeType::FloatVec3.location_count(), 1);
    }
}
