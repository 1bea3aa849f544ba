//! OpenGL backend over `glow`.
//!
//! Maps the backend trait onto a `glow::Context` the embedder created
//! (windowing and context acquisition live outside this crate).
//! Uniform locations are per-program indices into a table captured at
//! link time and resolve against the program currently in use.

use std::any::Any;
use std::collections::HashMap;

use glow::HasContext;

use crate::backend::{
    BufferHandle, GlBackend, LinkedProgram, ProgramHandle, ReflectedAttribute, ReflectedUniform,
    VertexArrayHandle,
};
use crate::error::GraphicsError;
use crate::types::{
    AttributeType, BufferTarget, BufferUsage, ComponentType, DrawMode, IndexElementType,
    UniformLocation, UniformType, UniformValue,
};

type NativeBuffer = <glow::Context as HasContext>::Buffer;
type NativeVertexArray = <glow::Context as HasContext>::VertexArray;
type NativeProgram = <glow::Context as HasContext>::Program;
type NativeShader = <glow::Context as HasContext>::Shader;
type NativeUniformLocation = <glow::Context as HasContext>::UniformLocation;

struct ProgramEntry {
    native: NativeProgram,
    /// Uniform locations indexed by the [`UniformLocation`] values
    /// handed out at link time.
    uniforms: Vec<NativeUniformLocation>,
}

pub struct GlowBackend {
    gl: glow::Context,
    next_id: u64,
    buffers: HashMap<u64, NativeBuffer>,
    vertex_arrays: HashMap<u64, NativeVertexArray>,
    programs: HashMap<u64, ProgramEntry>,
    active_program: Option<u64>,
}

impl GlowBackend {
    /// Wrap an already-current `glow::Context`.
    pub fn new(gl: glow::Context) -> Self {
        Self {
            gl,
            next_id: 1,
            buffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            programs: HashMap::new(),
            active_program: None,
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn buffer(&self, handle: BufferHandle) -> Option<NativeBuffer> {
        let native = self.buffers.get(&handle.0).copied();
        if native.is_none() {
            log::warn!("unknown buffer {:?}", handle);
        }
        native
    }
}

fn gl_target(target: BufferTarget) -> u32 {
    match target {
        BufferTarget::Array => glow::ARRAY_BUFFER,
        BufferTarget::ElementArray => glow::ELEMENT_ARRAY_BUFFER,
    }
}

fn gl_usage(usage: BufferUsage) -> u32 {
    match usage {
        BufferUsage::Static => glow::STATIC_DRAW,
        BufferUsage::Dynamic => glow::DYNAMIC_DRAW,
        BufferUsage::Stream => glow::STREAM_DRAW,
    }
}

fn gl_mode(mode: DrawMode) -> u32 {
    match mode {
        DrawMode::Points => glow::POINTS,
        DrawMode::Lines => glow::LINES,
        DrawMode::LineStrip => glow::LINE_STRIP,
        DrawMode::LineLoop => glow::LINE_LOOP,
        DrawMode::Triangles => glow::TRIANGLES,
        DrawMode::TriangleStrip => glow::TRIANGLE_STRIP,
        DrawMode::TriangleFan => glow::TRIANGLE_FAN,
    }
}

fn gl_component(ty: ComponentType) -> u32 {
    match ty {
        ComponentType::I8 => glow::BYTE,
        ComponentType::U8 => glow::UNSIGNED_BYTE,
        ComponentType::I16 => glow::SHORT,
        ComponentType::U16 => glow::UNSIGNED_SHORT,
        ComponentType::I32 => glow::INT,
        ComponentType::U32 => glow::UNSIGNED_INT,
        ComponentType::F32 => glow::FLOAT,
    }
}

fn gl_element(ty: IndexElementType) -> u32 {
    match ty {
        IndexElementType::U8 => glow::UNSIGNED_BYTE,
        IndexElementType::U16 => glow::UNSIGNED_SHORT,
        IndexElementType::U32 => glow::UNSIGNED_INT,
    }
}

fn attribute_type_from_gl(gl_type: u32) -> Option<AttributeType> {
    match gl_type {
        glow::FLOAT => Some(AttributeType::Float),
        glow::FLOAT_VEC2 => Some(AttributeType::FloatVec2),
        glow::FLOAT_VEC3 => Some(AttributeType::FloatVec3),
        glow::FLOAT_VEC4 => Some(AttributeType::FloatVec4),
        glow::FLOAT_MAT4 => Some(AttributeType::FloatMat4),
        _ => None,
    }
}

fn uniform_type_from_gl(gl_type: u32) -> Option<UniformType> {
    match gl_type {
        glow::INT => Some(UniformType::Int),
        glow::BOOL => Some(UniformType::Bool),
        glow::SAMPLER_2D => Some(UniformType::Sampler2D),
        glow::SAMPLER_CUBE => Some(UniformType::SamplerCube),
        glow::INT_VEC2 => Some(UniformType::IntVec2),
        glow::INT_VEC3 => Some(UniformType::IntVec3),
        glow::INT_VEC4 => Some(UniformType::IntVec4),
        glow::BOOL_VEC2 => Some(UniformType::BoolVec2),
        glow::BOOL_VEC3 => Some(UniformType::BoolVec3),
        glow::BOOL_VEC4 => Some(UniformType::BoolVec4),
        glow::FLOAT => Some(UniformType::Float),
        glow::FLOAT_VEC2 => Some(UniformType::FloatVec2),
        glow::FLOAT_VEC3 => Some(UniformType::FloatVec3),
        glow::FLOAT_VEC4 => Some(UniformType::FloatVec4),
        glow::FLOAT_MAT2 => Some(UniformType::FloatMat2),
        glow::FLOAT_MAT3 => Some(UniformType::FloatMat3),
        glow::FLOAT_MAT4 => Some(UniformType::FloatMat4),
        _ => None,
    }
}

unsafe fn compile_stage(
    gl: &glow::Context,
    stage: u32,
    source: &str,
) -> Result<NativeShader, GraphicsError> {
    let shader = gl
        .create_shader(stage)
        .map_err(GraphicsError::ResourceCreationFailed)?;
    gl.shader_source(shader, source);
    gl.compile_shader(shader);
    if !gl.get_shader_compile_status(shader) {
        let log = gl.get_shader_info_log(shader);
        gl.delete_shader(shader);
        return Err(GraphicsError::ShaderCompilation(log));
    }
    Ok(shader)
}

impl GlBackend for GlowBackend {
    fn name(&self) -> &str {
        "glow"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn create_buffer(&mut self) -> BufferHandle {
        let id = self.next_id();
        match unsafe { self.gl.create_buffer() } {
            Ok(native) => {
                self.buffers.insert(id, native);
            }
            Err(err) => log::error!("create_buffer failed: {}", err),
        }
        BufferHandle(id)
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferHandle>) {
        let native = buffer.and_then(|b| self.buffer(b));
        unsafe { self.gl.bind_buffer(gl_target(target), native) };
    }

    fn buffer_data(
        &mut self,
        target: BufferTarget,
        buffer: BufferHandle,
        data: &[u8],
        usage: BufferUsage,
    ) {
        let Some(native) = self.buffer(buffer) else {
            return;
        };
        let target = gl_target(target);
        unsafe {
            self.gl.bind_buffer(target, Some(native));
            self.gl.buffer_data_u8_slice(target, data, gl_usage(usage));
        }
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        if let Some(native) = self.buffers.remove(&buffer.0) {
            unsafe { self.gl.delete_buffer(native) };
        }
    }

    fn create_vertex_array(&mut self) -> Result<VertexArrayHandle, GraphicsError> {
        let native = unsafe { self.gl.create_vertex_array() }
            .map_err(GraphicsError::ResourceCreationFailed)?;
        let id = self.next_id();
        self.vertex_arrays.insert(id, native);
        Ok(VertexArrayHandle(id))
    }

    fn bind_vertex_array(&mut self, vao: Option<VertexArrayHandle>) {
        let native = vao.and_then(|v| self.vertex_arrays.get(&v.0).copied());
        unsafe { self.gl.bind_vertex_array(native) };
    }

    fn delete_vertex_array(&mut self, vao: VertexArrayHandle) {
        if let Some(native) = self.vertex_arrays.remove(&vao.0) {
            unsafe { self.gl.delete_vertex_array(native) };
        }
    }

    fn enable_vertex_attribute(&mut self, location: u32) {
        unsafe { self.gl.enable_vertex_attrib_array(location) };
    }

    fn vertex_attribute_pointer(
        &mut self,
        location: u32,
        size: u32,
        ty: ComponentType,
        normalized: bool,
        stride: u32,
        offset: u32,
    ) {
        unsafe {
            self.gl.vertex_attrib_pointer_f32(
                location,
                size as i32,
                gl_component(ty),
                normalized,
                stride as i32,
                offset as i32,
            );
        }
    }

    fn vertex_attribute_divisor(&mut self, location: u32, divisor: u32) {
        unsafe { self.gl.vertex_attrib_divisor(location, divisor) };
    }

    fn link_program(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
        feedback_varyings: Option<&[String]>,
    ) -> Result<LinkedProgram, GraphicsError> {
        let gl = &self.gl;
        unsafe {
            let vertex = compile_stage(gl, glow::VERTEX_SHADER, vertex_source)?;
            let fragment = match compile_stage(gl, glow::FRAGMENT_SHADER, fragment_source) {
                Ok(shader) => shader,
                Err(err) => {
                    gl.delete_shader(vertex);
                    return Err(err);
                }
            };

            let native = match gl.create_program() {
                Ok(program) => program,
                Err(err) => {
                    gl.delete_shader(vertex);
                    gl.delete_shader(fragment);
                    return Err(GraphicsError::ResourceCreationFailed(err));
                }
            };
            gl.attach_shader(native, vertex);
            gl.attach_shader(native, fragment);
            if let Some(varyings) = feedback_varyings {
                let names: Vec<&str> = varyings.iter().map(String::as_str).collect();
                gl.transform_feedback_varyings(native, &names, glow::INTERLEAVED_ATTRIBS);
            }
            gl.link_program(native);
            gl.detach_shader(native, vertex);
            gl.detach_shader(native, fragment);
            gl.delete_shader(vertex);
            gl.delete_shader(fragment);

            if !gl.get_program_link_status(native) {
                let log = gl.get_program_info_log(native);
                gl.delete_program(native);
                return Err(GraphicsError::ProgramLink(log));
            }

            let mut attributes = Vec::new();
            for i in 0..gl.get_active_attributes(native) {
                let Some(attribute) = gl.get_active_attribute(native, i) else {
                    continue;
                };
                if attribute.name.starts_with("gl_") {
                    continue;
                }
                let Some(location) = gl.get_attrib_location(native, &attribute.name) else {
                    continue;
                };
                let Some(ty) = attribute_type_from_gl(attribute.atype) else {
                    log::debug!(
                        "skipping attribute '{}' of unhandled GL type {:#x}",
                        attribute.name,
                        attribute.atype
                    );
                    continue;
                };
                attributes.push(ReflectedAttribute {
                    name: attribute.name,
                    location,
                    ty,
                });
            }

            let mut uniforms = Vec::new();
            let mut locations = Vec::new();
            for i in 0..gl.get_active_uniforms(native) {
                let Some(uniform) = gl.get_active_uniform(native, i) else {
                    continue;
                };
                // Block members report no location and are not settable
                // through uniform* calls.
                let Some(location) = gl.get_uniform_location(native, &uniform.name) else {
                    continue;
                };
                let Some(ty) = uniform_type_from_gl(uniform.utype) else {
                    log::debug!(
                        "skipping uniform '{}' of unhandled GL type {:#x}",
                        uniform.name,
                        uniform.utype
                    );
                    continue;
                };
                uniforms.push(ReflectedUniform {
                    name: uniform.name,
                    location: UniformLocation(locations.len() as u32),
                    ty,
                });
                locations.push(location);
            }

            let id = self.next_id;
            self.next_id += 1;
            self.programs.insert(
                id,
                ProgramEntry {
                    native,
                    uniforms: locations,
                },
            );
            Ok(LinkedProgram {
                handle: ProgramHandle(id),
                attributes,
                uniforms,
            })
        }
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        match program {
            Some(handle) => {
                let Some(entry) = self.programs.get(&handle.0) else {
                    log::warn!("unknown program {:?}", handle);
                    return;
                };
                unsafe { self.gl.use_program(Some(entry.native)) };
                self.active_program = Some(handle.0);
            }
            None => {
                unsafe { self.gl.use_program(None) };
                self.active_program = None;
            }
        }
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if let Some(entry) = self.programs.remove(&program.0) {
            unsafe { self.gl.delete_program(entry.native) };
        }
        if self.active_program == Some(program.0) {
            self.active_program = None;
        }
    }

    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        let Some(entry) = self.active_program.and_then(|id| self.programs.get(&id)) else {
            log::warn!("set_uniform with no program in use");
            return;
        };
        let Some(native) = entry.uniforms.get(location.0 as usize) else {
            log::warn!("uniform location {:?} out of range", location);
            return;
        };
        let location = Some(native);
        let gl = &self.gl;
        unsafe {
            match value {
                UniformValue::Int(v) => gl.uniform_1_i32(location, *v),
                UniformValue::IntVec2(v) => gl.uniform_2_i32_slice(location, v),
                UniformValue::IntVec3(v) => gl.uniform_3_i32_slice(location, v),
                UniformValue::IntVec4(v) => gl.uniform_4_i32_slice(location, v),
                UniformValue::Float(v) => gl.uniform_1_f32(location, *v),
                UniformValue::FloatArray(v) => gl.uniform_1_f32_slice(location, v),
                UniformValue::Vec2(v) => gl.uniform_2_f32_slice(location, v),
                UniformValue::Vec3(v) => gl.uniform_3_f32_slice(location, v),
                UniformValue::Vec4(v) => gl.uniform_4_f32_slice(location, v),
                UniformValue::Mat2(v) => gl.uniform_matrix_2_f32_slice(location, false, v),
                UniformValue::Mat3(v) => gl.uniform_matrix_3_f32_slice(location, false, v),
                UniformValue::Mat4(v) => gl.uniform_matrix_4_f32_slice(location, false, v),
            }
        }
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32) {
        unsafe {
            self.gl
                .draw_arrays(gl_mode(mode), first as i32, count as i32)
        };
    }

    fn draw_elements(
        &mut self,
        mode: DrawMode,
        count: u32,
        element_type: IndexElementType,
        byte_offset: u32,
    ) {
        unsafe {
            self.gl.draw_elements(
                gl_mode(mode),
                count as i32,
                gl_element(element_type),
                byte_offset as i32,
            );
        }
    }

    fn draw_arrays_instanced(&mut self, mode: DrawMode, first: u32, count: u32, instances: u32) {
        unsafe {
            self.gl.draw_arrays_instanced(
                gl_mode(mode),
                first as i32,
                count as i32,
                instances as i32,
            );
        }
    }

    fn draw_elements_instanced(
        &mut self,
        mode: DrawMode,
        count: u32,
        element_type: IndexElementType,
        byte_offset: u32,
        instances: u32,
    ) {
        unsafe {
            self.gl.draw_elements_instanced(
                gl_mode(mode),
                count as i32,
                gl_element(element_type),
                byte_offset as i32,
                instances as i32,
            );
        }
    }

    fn bind_feedback_buffer(&mut self, index: u32, buffer: Option<BufferHandle>) {
        let native = buffer.and_then(|b| self.buffer(b));
        unsafe {
            self.gl
                .bind_buffer_base(glow::TRANSFORM_FEEDBACK_BUFFER, index, native)
        };
    }

    fn begin_transform_feedback(&mut self, mode: DrawMode) {
        unsafe { self.gl.begin_transform_feedback(gl_mode(mode)) };
    }

    fn end_transform_feedback(&mut self) {
        unsafe { self.gl.end_transform_feedback() };
    }

    fn set_rasterizer_discard(&mut self, enabled: bool) {
        unsafe {
            if enabled {
                self.gl.enable(glow::RASTERIZER_DISCARD);
            } else {
                self.gl.disable(glow::RASTERIZER_DISCARD);
            }
        }
    }
}
