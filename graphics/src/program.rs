//! Shader programs.
//!
//! A [`Program`] owns a pair of GLSL sources and the linked device
//! program, reflected into lookup tables: attributes keyed by buffer
//! name (shader prefix stripped) and uniforms keyed by declared name.
//! Linking is lazy; the first [`Program::use_program`] compiles. A
//! failed relink keeps the previous program running and surfaces the
//! backend log through [`Program::error`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::backend::{ProgramHandle, ReflectedAttribute, ReflectedUniform};
use crate::context::{Context, ContextId, ProgramBinding};
use crate::error::GraphicsError;
use crate::types::{
    AttributeInfo, UniformInfo, UniformType, UniformValue, ATTRIBUTE_NAME_PREFIX,
};

static NEXT_PROGRAM_ID: AtomicU64 = AtomicU64::new(1);

/// Construction parameters for a [`Program`].
#[derive(Debug, Clone)]
pub struct ProgramDescriptor {
    pub vertex_source: String,
    pub fragment_source: String,
    /// Varyings captured by transform feedback, interleaved into the
    /// buffer bound at feedback slot zero.
    pub feedback_varyings: Option<Vec<String>>,
}

impl ProgramDescriptor {
    pub fn new(vertex_source: impl Into<String>, fragment_source: impl Into<String>) -> Self {
        Self {
            vertex_source: vertex_source.into(),
            fragment_source: fragment_source.into(),
            feedback_varyings: None,
        }
    }

    pub fn with_feedback_varyings(mut self, varyings: Vec<String>) -> Self {
        self.feedback_varyings = Some(varyings);
        self
    }
}

pub struct Program {
    instance: u64,
    vertex_source: String,
    fragment_source: String,
    feedback_varyings: Option<Vec<String>>,
    handle: Option<ProgramHandle>,
    attributes: Arc<HashMap<String, AttributeInfo>>,
    uniforms: HashMap<String, UniformInfo>,
    generation: u64,
    error: Option<String>,
    owner: Option<ContextId>,
    disposed: bool,
}

impl Program {
    pub fn new(descriptor: ProgramDescriptor) -> Self {
        Self {
            instance: NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed),
            vertex_source: descriptor.vertex_source,
            fragment_source: descriptor.fragment_source,
            feedback_varyings: descriptor.feedback_varyings,
            handle: None,
            attributes: Arc::new(HashMap::new()),
            uniforms: HashMap::new(),
            generation: 0,
            error: None,
            owner: None,
            disposed: false,
        }
    }

    /// Backend log of the last failed compile or link.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_linked(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<ProgramHandle> {
        self.handle
    }

    /// Reflected attributes keyed by buffer-facing name.
    pub fn attributes(&self) -> &HashMap<String, AttributeInfo> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes.get(name)
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformInfo> {
        self.uniforms.get(name)
    }

    fn binding(&self) -> ProgramBinding {
        ProgramBinding {
            instance: self.instance,
            generation: self.generation,
            attributes: Arc::clone(&self.attributes),
        }
    }

    /// Compile and link `vertex`/`fragment`. On failure the previous
    /// program, tables and sources stay in place.
    fn link(&mut self, ctx: &mut Context, vertex: &str, fragment: &str) -> Result<(), GraphicsError> {
        ctx.check_owner(self.owner, "program")?;
        self.owner = Some(ctx.id());
        let linked = match ctx.backend_mut().link_program(
            vertex,
            fragment,
            self.feedback_varyings.as_deref(),
        ) {
            Ok(linked) => linked,
            Err(err) => {
                log::warn!("program link failed, keeping previous: {}", err);
                self.error = Some(err.to_string());
                return Err(err);
            }
        };

        if let Some(old) = self.handle.take() {
            ctx.backend_mut().delete_program(old);
            ctx.note_program_destroyed();
        }
        ctx.note_program_created();
        self.handle = Some(linked.handle);
        self.attributes = Arc::new(attribute_table(&linked.attributes));
        self.uniforms = uniform_table(&linked.uniforms);
        self.generation += 1;
        self.error = None;
        log::trace!(
            "program {} linked as {:?}: {} attributes, {} uniforms",
            self.instance,
            linked.handle,
            self.attributes.len(),
            self.uniforms.len()
        );

        // A relink of the active program must retarget the device
        // binding, or draws keep running the old handle.
        if ctx
            .active_program()
            .map(|b| b.instance == self.instance)
            .unwrap_or(false)
        {
            ctx.backend_mut().use_program(Some(linked.handle));
            ctx.set_active_program(self.binding());
        }
        Ok(())
    }

    /// Replace both shader stages and relink. On failure the program
    /// keeps running its previous sources.
    pub fn set_source(
        &mut self,
        ctx: &mut Context,
        vertex_source: impl Into<String>,
        fragment_source: impl Into<String>,
    ) -> Result<(), GraphicsError> {
        assert!(!self.disposed, "program used after dispose");
        let vertex = vertex_source.into();
        let fragment = fragment_source.into();
        self.link(ctx, &vertex, &fragment)?;
        self.vertex_source = vertex;
        self.fragment_source = fragment;
        Ok(())
    }

    /// Make this the active program, linking it first if needed. A
    /// repeat call on the already-active program issues nothing.
    pub fn use_program(&mut self, ctx: &mut Context) -> Result<(), GraphicsError> {
        assert!(!self.disposed, "program used after dispose");
        if self.handle.is_none() {
            let vertex = self.vertex_source.clone();
            let fragment = self.fragment_source.clone();
            self.link(ctx, &vertex, &fragment)?;
        }
        let already_active = ctx
            .active_program()
            .map(|b| b.instance == self.instance && b.generation == self.generation)
            .unwrap_or(false);
        if !already_active {
            ctx.backend_mut().use_program(self.handle);
            ctx.set_active_program(self.binding());
        }
        Ok(())
    }

    /// Upload one uniform. The program must be the one in use; uniform
    /// locations resolve against the active program on the device.
    ///
    /// A name the program does not use is silently skipped; a value
    /// whose shape does not match the reflected type, or a call while
    /// another program is in use, is skipped with a warning. Matrices
    /// upload column-major, never transposed.
    pub fn bind_uniform(&self, ctx: &mut Context, name: &str, value: &UniformValue) {
        assert!(!self.disposed, "program used after dispose");
        if self.handle.is_none() {
            return;
        }
        let active = ctx
            .active_program()
            .map(|b| b.instance == self.instance)
            .unwrap_or(false);
        if !active {
            log::warn!("uniform '{}' set on a program not in use; skipping", name);
            return;
        }
        let Some(info) = self.uniforms.get(name) else {
            return;
        };
        if !value_matches(info.ty, value) {
            log::warn!(
                "uniform '{}' expects {:?}, got {:?}; skipping",
                name,
                info.ty,
                value
            );
            return;
        }
        ctx.backend_mut().set_uniform(info.location, value);
    }

    /// Upload several uniforms of the active program.
    pub fn bind_uniforms(&self, ctx: &mut Context, values: &[(&str, UniformValue)]) {
        for (name, value) in values {
            self.bind_uniform(ctx, name, value);
        }
    }

    /// Release the device program. Safe to call more than once; all
    /// other operations panic afterwards.
    pub fn dispose(&mut self, ctx: &mut Context) {
        if self.disposed {
            return;
        }
        ctx.clear_active_program(self.instance);
        if let Some(handle) = self.handle.take() {
            ctx.backend_mut().delete_program(handle);
            ctx.note_program_destroyed();
        }
        self.disposed = true;
    }
}

/// Key reflected attributes by buffer name: the conventional shader
/// prefix is stripped so `a_position` matches the `position` buffer.
fn attribute_table(reflected: &[ReflectedAttribute]) -> HashMap<String, AttributeInfo> {
    reflected
        .iter()
        .map(|attr| {
            let name = attr
                .name
                .strip_prefix(ATTRIBUTE_NAME_PREFIX)
                .unwrap_or(&attr.name)
                .to_string();
            (
                name.clone(),
                AttributeInfo {
                    name,
                    location: attr.location,
                    ty: attr.ty,
                    size: attr.ty.component_count(),
                },
            )
        })
        .collect()
}

/// Key reflected uniforms by declared name. Array uniforms reported as
/// `name[0]` get a second entry under the bare `name`, flagged as an
/// array; struct members (names with a dot) do not.
fn uniform_table(reflected: &[ReflectedUniform]) -> HashMap<String, UniformInfo> {
    let mut table = HashMap::new();
    for uniform in reflected {
        table.insert(
            uniform.name.clone(),
            UniformInfo {
                location: uniform.location,
                ty: uniform.ty,
                array: false,
            },
        );
        if let Some(bracket) = uniform.name.find('[') {
            if bracket > 0 && !uniform.name.contains('.') {
                table.insert(
                    uniform.name[..bracket].to_string(),
                    UniformInfo {
                        location: uniform.location,
                        ty: uniform.ty,
                        array: true,
                    },
                );
            }
        }
    }
    table
}

fn value_matches(ty: UniformType, value: &UniformValue) -> bool {
    matches!(
        (ty, value),
        (
            UniformType::Int
                | UniformType::Bool
                | UniformType::Sampler2D
                | UniformType::SamplerCube,
            UniformValue::Int(_)
        ) | (
            UniformType::IntVec2 | UniformType::BoolVec2,
            UniformValue::IntVec2(_)
        ) | (
            UniformType::IntVec3 | UniformType::BoolVec3,
            UniformValue::IntVec3(_)
        ) | (
            UniformType::IntVec4 | UniformType::BoolVec4,
            UniformValue::IntVec4(_)
        ) | (
            UniformType::Float,
            UniformValue::Float(_) | UniformValue::FloatArray(_)
        ) | (UniformType::FloatVec2, UniformValue::Vec2(_))
            | (UniformType::FloatVec3, UniformValue::Vec3(_))
            | (UniformType::FloatVec4, UniformValue::Vec4(_))
            | (UniformType::FloatMat2, UniformValue::Mat2(_))
            | (UniformType::FloatMat3, UniformValue::Mat3(_))
            | (UniformType::FloatMat4, UniformValue::Mat4(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::Command;
    use crate::types::AttributeType;

    const VS: &str = r#"
        in vec3 a_position;
        in vec2 a_uv;
        uniform mat4 u_mvp;
        uniform float u_weights[3];
        void main() { gl_Position = u_mvp * vec4(a_position, 1.0); }
    "#;

    const FS: &str = r#"
        uniform vec4 u_color;
        void main() {}
    "#;

    fn program() -> Program {
        Program::new(ProgramDescriptor::new(VS, FS))
    }

    #[test]
    fn first_use_links_then_caches() {
        let mut ctx = Context::dummy();
        let mut program = program();
        assert!(!program.is_linked());
        program.use_program(&mut ctx).unwrap();
        program.use_program(&mut ctx).unwrap();
        assert!(program.is_linked());

        let uses = ctx
            .dummy_backend()
            .unwrap()
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::UseProgram(Some(_))))
            .count();
        assert_eq!(uses, 1);
        assert_eq!(ctx.stats().live_programs(), 1);
    }

    #[test]
    fn attribute_names_drop_the_shader_prefix() {
        let mut ctx = Context::dummy();
        let mut program = program();
        program.use_program(&mut ctx).unwrap();
        let position = program.attribute("position").unwrap();
        assert_eq!(position.ty, AttributeType::FloatVec3);
        assert_eq!(position.size, 3);
        assert!(program.attribute("a_position").is_none());
        assert!(program.attribute("uv").is_some());
    }

    #[test]
    fn array_uniforms_resolve_by_base_name() {
        let mut ctx = Context::dummy();
        let mut program = program();
        program.use_program(&mut ctx).unwrap();
        let base = program.uniform("u_weights").unwrap();
        assert!(base.array);
        let first = program.uniform("u_weights[0]").unwrap();
        assert!(!first.array);
        assert_eq!(base.location, first.location);
    }

    #[test]
    fn failed_relink_keeps_the_running_program() {
        let mut ctx = Context::dummy();
        let mut program = program();
        program.use_program(&mut ctx).unwrap();
        let old_handle = program.handle().unwrap();

        let err = program.set_source(&mut ctx, "in vec3 a_position;", FS);
        assert!(err.is_err());
        assert_eq!(program.handle(), Some(old_handle));
        assert!(program.error().unwrap().contains("main"));

        // Relinking with good sources clears the error.
        program.set_source(&mut ctx, VS, FS).unwrap();
        assert!(program.error().is_none());
        assert_ne!(program.handle(), Some(old_handle));
        assert_eq!(ctx.stats().live_programs(), 1);
    }

    #[test]
    fn uniform_dispatch_checks_shape() {
        let mut ctx = Context::dummy();
        let mut program = program();
        program.use_program(&mut ctx).unwrap();

        program.bind_uniform(&mut ctx, "u_mvp", &UniformValue::Mat4([0.0; 16]));
        program.bind_uniform(&mut ctx, "u_mvp", &UniformValue::Float(1.0)); // shape mismatch
        program.bind_uniform(&mut ctx, "u_missing", &UniformValue::Float(1.0));
        program.bind_uniform(
            &mut ctx,
            "u_weights",
            &UniformValue::FloatArray(vec![1.0, 2.0, 3.0]),
        );

        let sets = ctx
            .dummy_backend()
            .unwrap()
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::SetUniform { .. }))
            .count();
        assert_eq!(sets, 2);
    }

    #[test]
    fn uniforms_only_reach_the_program_in_use() {
        let mut ctx = Context::dummy();
        let mut a = program();
        let mut b = program();
        a.use_program(&mut ctx).unwrap();
        b.use_program(&mut ctx).unwrap();

        // b is in use; a's upload must not land in b's locations.
        a.bind_uniform(&mut ctx, "u_mvp", &UniformValue::Mat4([0.0; 16]));
        b.bind_uniform(&mut ctx, "u_mvp", &UniformValue::Mat4([0.0; 16]));

        let sets = ctx
            .dummy_backend()
            .unwrap()
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::SetUniform { .. }))
            .count();
        assert_eq!(sets, 1);
    }

    #[test]
    fn dispose_clears_the_active_binding() {
        let mut ctx = Context::dummy();
        let mut program = program();
        program.use_program(&mut ctx).unwrap();
        assert!(ctx.active_program().is_some());
        program.dispose(&mut ctx);
        program.dispose(&mut ctx);
        assert!(ctx.active_program().is_none());
        assert_eq!(ctx.stats().live_programs(), 0);
    }
}
