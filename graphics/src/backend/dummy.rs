//! Recording backend for tests and headless runs.
//!
//! Every trait call is appended to a command log that tests inspect.
//! Program reflection is served by a small GLSL declaration scan, so
//! resource-layer logic (name mangling, uniform dispatch, attribute
//! binding) behaves as it would against a real driver.

use std::any::Any;

use crate::backend::{
    BufferHandle, GlBackend, LinkedProgram, ProgramHandle, ReflectedAttribute, ReflectedUniform,
    VertexArrayHandle,
};
use crate::error::GraphicsError;
use crate::types::{
    AttributeType, BufferTarget, BufferUsage, ComponentType, DrawMode, IndexElementType,
    UniformLocation, UniformType, UniformValue,
};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateBuffer(BufferHandle),
    BindBuffer {
        target: BufferTarget,
        buffer: Option<BufferHandle>,
    },
    BufferData {
        target: BufferTarget,
        buffer: BufferHandle,
        byte_len: usize,
        usage: BufferUsage,
    },
    DeleteBuffer(BufferHandle),
    CreateVertexArray(VertexArrayHandle),
    BindVertexArray(Option<VertexArrayHandle>),
    DeleteVertexArray(VertexArrayHandle),
    EnableVertexAttribute {
        location: u32,
    },
    VertexAttributePointer {
        location: u32,
        size: u32,
        ty: ComponentType,
        normalized: bool,
        stride: u32,
        offset: u32,
    },
    VertexAttributeDivisor {
        location: u32,
        divisor: u32,
    },
    LinkProgram(ProgramHandle),
    UseProgram(Option<ProgramHandle>),
    DeleteProgram(ProgramHandle),
    SetUniform {
        location: UniformLocation,
        value: UniformValue,
    },
    DrawArrays {
        mode: DrawMode,
        first: u32,
        count: u32,
    },
    DrawElements {
        mode: DrawMode,
        count: u32,
        element_type: IndexElementType,
        byte_offset: u32,
    },
    DrawArraysInstanced {
        mode: DrawMode,
        first: u32,
        count: u32,
        instances: u32,
    },
    DrawElementsInstanced {
        mode: DrawMode,
        count: u32,
        element_type: IndexElementType,
        byte_offset: u32,
        instances: u32,
    },
    BindFeedbackBuffer {
        index: u32,
        buffer: Option<BufferHandle>,
    },
    BeginTransformFeedback(DrawMode),
    EndTransformFeedback,
    SetRasterizerDiscard(bool),
}

impl Command {
    /// Whether this command issues geometry to the device.
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            Command::DrawArrays { .. }
                | Command::DrawElements { .. }
                | Command::DrawArraysInstanced { .. }
                | Command::DrawElementsInstanced { .. }
        )
    }
}

/// Backend that records calls instead of talking to a device.
pub struct DummyBackend {
    next_id: u64,
    commands: Vec<Command>,
    vertex_arrays_supported: bool,
    fail_next_link: Option<String>,
}

impl DummyBackend {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            commands: Vec::new(),
            vertex_arrays_supported: true,
            fail_next_link: None,
        }
    }

    /// All commands recorded so far, in issue order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Drain the recorded commands.
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Number of recorded draw calls.
    pub fn draw_call_count(&self) -> usize {
        self.commands.iter().filter(|c| c.is_draw()).count()
    }

    /// Make [`GlBackend::create_vertex_array`] fail, as on a device
    /// without vertex array objects.
    pub fn set_vertex_arrays_supported(&mut self, supported: bool) {
        self.vertex_arrays_supported = supported;
    }

    /// Make the next [`GlBackend::link_program`] fail with `log`.
    pub fn fail_next_link(&mut self, log: impl Into<String>) {
        self.fail_next_link = Some(log.into());
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record(&mut self, command: Command) {
        log::trace!("dummy: {:?}", command);
        self.commands.push(command);
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GlBackend for DummyBackend {
    fn name(&self) -> &str {
        "dummy"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn create_buffer(&mut self) -> BufferHandle {
        let handle = BufferHandle(self.next_id());
        self.record(Command::CreateBuffer(handle));
        handle
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferHandle>) {
        self.record(Command::BindBuffer { target, buffer });
    }

    fn buffer_data(
        &mut self,
        target: BufferTarget,
        buffer: BufferHandle,
        data: &[u8],
        usage: BufferUsage,
    ) {
        self.record(Command::BufferData {
            target,
            buffer,
            byte_len: data.len(),
            usage,
        });
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.record(Command::DeleteBuffer(buffer));
    }

    fn create_vertex_array(&mut self) -> Result<VertexArrayHandle, GraphicsError> {
        if !self.vertex_arrays_supported {
            return Err(GraphicsError::FeatureNotSupported(
                "vertex array objects".to_string(),
            ));
        }
        let handle = VertexArrayHandle(self.next_id());
        self.record(Command::CreateVertexArray(handle));
        Ok(handle)
    }

    fn bind_vertex_array(&mut self, vao: Option<VertexArrayHandle>) {
        self.record(Command::BindVertexArray(vao));
    }

    fn delete_vertex_array(&mut self, vao: VertexArrayHandle) {
        self.record(Command::DeleteVertexArray(vao));
    }

    fn enable_vertex_attribute(&mut self, location: u32) {
        self.record(Command::EnableVertexAttribute { location });
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
        self.record(Command::VertexAttributePointer {
            location,
            size,
            ty,
            normalized,
            stride,
            offset,
        });
    }

    fn vertex_attribute_divisor(&mut self, location: u32, divisor: u32) {
        self.record(Command::VertexAttributeDivisor { location, divisor });
    }

    fn link_program(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
        _feedback_varyings: Option<&[String]>,
    ) -> Result<LinkedProgram, GraphicsError> {
        if let Some(log) = self.fail_next_link.take() {
            return Err(GraphicsError::ProgramLink(log));
        }
        if !vertex_source.contains("void main") {
            return Err(GraphicsError::ShaderCompilation(
                "vertex shader: missing entry point 'main'".to_string(),
            ));
        }
        if !fragment_source.contains("void main") {
            return Err(GraphicsError::ShaderCompilation(
                "fragment shader: missing entry point 'main'".to_string(),
            ));
        }

        let attributes = scan_attributes(vertex_source);
        let mut uniforms = scan_uniforms(vertex_source);
        for uniform in scan_uniforms(fragment_source) {
            if !uniforms.iter().any(|u| u.0 == uniform.0) {
                uniforms.push(uniform);
            }
        }
        let uniforms = uniforms
            .into_iter()
            .enumerate()
            .map(|(i, (name, ty))| ReflectedUniform {
                name,
                location: UniformLocation(i as u32),
                ty,
            })
            .collect();

        let handle = ProgramHandle(self.next_id());
        self.record(Command::LinkProgram(handle));
        Ok(LinkedProgram {
            handle,
            attributes,
            uniforms,
        })
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        self.record(Command::UseProgram(program));
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.record(Command::DeleteProgram(program));
    }

    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        self.record(Command::SetUniform {
            location,
            value: value.clone(),
        });
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32) {
        self.record(Command::DrawArrays { mode, first, count });
    }

    fn draw_elements(
        &mut self,
        mode: DrawMode,
        count: u32,
        element_type: IndexElementType,
        byte_offset: u32,
    ) {
        self.record(Command::DrawElements {
            mode,
            count,
            element_type,
            byte_offset,
        });
    }

    fn draw_arrays_instanced(&mut self, mode: DrawMode, first: u32, count: u32, instances: u32) {
        self.record(Command::DrawArraysInstanced {
            mode,
            first,
            count,
            instances,
        });
    }

    fn draw_elements_instanced(
        &mut self,
        mode: DrawMode,
        count: u32,
        element_type: IndexElementType,
        byte_offset: u32,
        instances: u32,
    ) {
        self.record(Command::DrawElementsInstanced {
            mode,
            count,
            element_type,
            byte_offset,
            instances,
        });
    }

    fn bind_feedback_buffer(&mut self, index: u32, buffer: Option<BufferHandle>) {
        self.record(Command::BindFeedbackBuffer { index, buffer });
    }

    fn begin_transform_feedback(&mut self, mode: DrawMode) {
        self.record(Command::BeginTransformFeedback(mode));
    }

    fn end_transform_feedback(&mut self) {
        self.record(Command::EndTransformFeedback);
    }

    fn set_rasterizer_discard(&mut self, enabled: bool) {
        self.record(Command::SetRasterizerDiscard(enabled));
    }
}

/// Strip comments and preprocessor lines, leaving declaration text.
fn strip_noise(source: &str) -> String {
    let mut text = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("/*") {
        text.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => {
                rest = "";
                break;
            }
        }
    }
    text.push_str(rest);

    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let line = match line.find("//") {
            Some(pos) => &line[..pos],
            None => line,
        };
        if line.trim_start().starts_with('#') {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Declarations of a shader, one statement at a time. Statements end at
/// `;`; anything before the last brace in a chunk is function body or
/// block structure and is dropped.
fn declarations(source: &str) -> Vec<Vec<String>> {
    let text = strip_noise(source);
    let mut decls = Vec::new();
    for chunk in text.split(';') {
        let stmt = chunk.rsplit(['{', '}']).next().unwrap_or("").trim();
        if stmt.is_empty() {
            continue;
        }
        // layout(location = N) qualifiers carry no information the
        // sequential-location scan needs.
        let stmt = if let Some(rest) = stmt.strip_prefix("layout") {
            match rest.find(')') {
                Some(pos) => rest[pos + 1..].trim(),
                None => continue,
            }
        } else {
            stmt
        };
        let mut tokens: Vec<String> = stmt.split_whitespace().map(str::to_string).collect();
        while matches!(
            tokens.first().map(String::as_str),
            Some("flat" | "smooth" | "centroid" | "invariant" | "noperspective")
        ) {
            tokens.remove(0);
        }
        if !tokens.is_empty() {
            decls.push(tokens);
        }
    }
    decls
}

fn is_precision_qualifier(token: &str) -> bool {
    matches!(token, "highp" | "mediump" | "lowp")
}

fn attribute_type_of(token: &str) -> Option<AttributeType> {
    match token {
        "float" => Some(AttributeType::Float),
        "vec2" => Some(AttributeType::FloatVec2),
        "vec3" => Some(AttributeType::FloatVec3),
        "vec4" => Some(AttributeType::FloatVec4),
        "mat4" => Some(AttributeType::FloatMat4),
        _ => None,
    }
}

fn uniform_type_of(token: &str) -> Option<UniformType> {
    match token {
        "int" => Some(UniformType::Int),
        "bool" => Some(UniformType::Bool),
        "sampler2D" => Some(UniformType::Sampler2D),
        "samplerCube" => Some(UniformType::SamplerCube),
        "ivec2" => Some(UniformType::IntVec2),
        "ivec3" => Some(UniformType::IntVec3),
        "ivec4" => Some(UniformType::IntVec4),
        "bvec2" => Some(UniformType::BoolVec2),
        "bvec3" => Some(UniformType::BoolVec3),
        "bvec4" => Some(UniformType::BoolVec4),
        "float" => Some(UniformType::Float),
        "vec2" => Some(UniformType::FloatVec2),
        "vec3" => Some(UniformType::FloatVec3),
        "vec4" => Some(UniformType::FloatVec4),
        "mat2" => Some(UniformType::FloatMat2),
        "mat3" => Some(UniformType::FloatMat3),
        "mat4" => Some(UniformType::FloatMat4),
        _ => None,
    }
}

/// Vertex-stage `in` declarations, with locations assigned in
/// declaration order. A mat4 occupies four consecutive locations.
fn scan_attributes(vertex_source: &str) -> Vec<ReflectedAttribute> {
    let mut attributes = Vec::new();
    let mut location = 0u32;
    for tokens in declarations(vertex_source) {
        if tokens.first().map(String::as_str) != Some("in") {
            continue;
        }
        let mut rest = &tokens[1..];
        if rest.first().map(|t| is_precision_qualifier(t)).unwrap_or(false) {
            rest = &rest[1..];
        }
        let (Some(ty_token), Some(name)) = (rest.first(), rest.get(1)) else {
            continue;
        };
        let Some(ty) = attribute_type_of(ty_token) else {
            log::debug!("skipping attribute '{}' of unhandled type '{}'", name, ty_token);
            continue;
        };
        attributes.push(ReflectedAttribute {
            name: name.clone(),
            location,
            ty,
        });
        location += ty.location_count();
    }
    attributes
}

/// `uniform` declarations of one stage. Array uniforms are reported
/// under their first-element name, GL style.
fn scan_uniforms(source: &str) -> Vec<(String, UniformType)> {
    let mut uniforms = Vec::new();
    for tokens in declarations(source) {
        if tokens.first().map(String::as_str) != Some("uniform") {
            continue;
        }
        let mut rest = &tokens[1..];
        if rest.first().map(|t| is_precision_qualifier(t)).unwrap_or(false) {
            rest = &rest[1..];
        }
        let (Some(ty_token), Some(name)) = (rest.first(), rest.get(1)) else {
            continue;
        };
        let Some(ty) = uniform_type_of(ty_token) else {
            log::debug!("skipping uniform '{}' of unhandled type '{}'", name, ty_token);
            continue;
        };
        let reported = match name.find('[') {
            Some(pos) => format!("{}[0]", &name[..pos]),
            None => name.clone(),
        };
        uniforms.push((reported, ty));
    }
    uniforms
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = r#"
        #version 300 es
        precision highp float;
        // per-vertex inputs
        in vec3 a_position;
        in vec2 a_uv;
        in mat4 a_offset; /* per-instance transform */
        in vec3 a_normal;
        uniform mat4 u_mvp;
        uniform highp float u_weights[4];
        out vec2 v_uv;
        void main() {
            v_uv = a_uv;
            gl_Position = u_mvp * a_offset * vec4(a_position, 1.0);
        }
    "#;

    const FS: &str = r#"
        #version 300 es
        precision mediump float;
        uniform sampler2D u_albedo;
        uniform mat4 u_mvp;
        in vec2 v_uv;
        out vec4 color;
        void main() { color = texture(u_albedo, v_uv); }
    "#;

    #[test]
    fn attribute_locations_skip_matrix_slots() {
        let attrs = scan_attributes(VS);
        let by_name: Vec<(&str, u32, AttributeType)> = attrs
            .iter()
            .map(|a| (a.name.as_str(), a.location, a.ty))
            .collect();
        assert_eq!(
            by_name,
            vec![
                ("a_position", 0, AttributeType::FloatVec3),
                ("a_uv", 1, AttributeType::FloatVec2),
                ("a_offset", 2, AttributeType::FloatMat4),
                ("a_normal", 6, AttributeType::FloatVec3),
            ]
        );
    }

    #[test]
    fn uniforms_deduplicate_across_stages() {
        let mut backend = DummyBackend::new();
        let linked = backend.link_program(VS, FS, None).unwrap();
        let names: Vec<&str> = linked.uniforms.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["u_mvp", "u_weights[0]", "u_albedo"]);
        assert_eq!(linked.uniforms[1].ty, UniformType::Float);
        assert_eq!(linked.uniforms[2].ty, UniformType::Sampler2D);
    }

    #[test]
    fn missing_entry_point_fails_compilation() {
        let mut backend = DummyBackend::new();
        let err = backend.link_program("in vec3 a_position;", FS, None).unwrap_err();
        assert!(matches!(err, GraphicsError::ShaderCompilation(_)));
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn forced_link_failure_is_one_shot() {
        let mut backend = DummyBackend::new();
        backend.fail_next_link("varying limit exceeded");
        assert!(backend.link_program(VS, FS, None).is_err());
        assert!(backend.link_program(VS, FS, None).is_ok());
    }

    #[test]
    fn vertex_arrays_can_be_disabled() {
        let mut backend = DummyBackend::new();
        backend.set_vertex_arrays_supported(false);
        assert!(matches!(
            backend.create_vertex_array(),
            Err(GraphicsError::FeatureNotSupported(_))
        ));
    }

    #[test]
    fn commands_record_in_issue_order() {
        let mut backend = DummyBackend::new();
        let buffer = backend.create_buffer();
        backend.buffer_data(BufferTarget::Array, buffer, &[0u8; 12], BufferUsage::Static);
        backend.draw_arrays(DrawMode::Triangles, 0, 3);
        assert_eq!(backend.draw_call_count(), 1);
        assert_eq!(
            backend.commands(),
            &[
                Command::CreateBuffer(buffer),
                Command::BufferData {
                    target: BufferTarget::Array,
                    buffer,
                    byte_len: 12,
                    usage: BufferUsage::Static,
                },
                Command::DrawArrays {
                    mode: DrawMode::Triangles,
                    first: 0,
                    count: 3,
                },
            ]
        );
    }
}
