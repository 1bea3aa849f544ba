//! Rendering context.
//!
//! A [`Context`] owns a backend plus the client-side binding caches
//! that make redundant `use_program` / `bind_vertex_array` calls
//! disappear. Resources capture the [`ContextId`] of the context they
//! are first bound to and refuse use with any other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::backend::{DummyBackend, GlBackend, VertexArrayHandle};
use crate::error::GraphicsError;
use crate::types::AttributeInfo;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a context, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

/// Snapshot of the program currently in use, published by
/// [`crate::Program::use_program`] and consumed by vertex arrays to
/// decide when attribute pointers must be re-bound.
#[derive(Debug, Clone)]
pub struct ProgramBinding {
    /// Identity of the owning [`crate::Program`] instance.
    pub(crate) instance: u64,
    /// Link generation of that instance; bumps on every relink.
    pub(crate) generation: u64,
    /// Reflected attributes keyed by buffer-facing name.
    pub(crate) attributes: Arc<HashMap<String, AttributeInfo>>,
}

impl ProgramBinding {
    /// Reflected attribute for a buffer name, if the program uses it.
    pub fn attribute(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes.get(name)
    }
}

/// Created/destroyed counters for one resource kind.
#[derive(Debug, Clone, Copy, Default)]
struct Counter {
    created: u64,
    destroyed: u64,
}

impl Counter {
    fn live(&self) -> u64 {
        self.created - self.destroyed
    }
}

/// Live device-object accounting, for leak checks in tests and logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceStats {
    buffers: Counter,
    programs: Counter,
    vertex_arrays: Counter,
}

impl ResourceStats {
    pub fn live_buffers(&self) -> u64 {
        self.buffers.live()
    }

    pub fn live_programs(&self) -> u64 {
        self.programs.live()
    }

    pub fn live_vertex_arrays(&self) -> u64 {
        self.vertex_arrays.live()
    }
}

pub struct Context {
    id: ContextId,
    backend: Box<dyn GlBackend>,
    active_program: Option<ProgramBinding>,
    bound_vertex_array: Option<VertexArrayHandle>,
    stats: ResourceStats,
}

impl Context {
    pub fn new(backend: Box<dyn GlBackend>) -> Self {
        let id = ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed));
        log::info!("created context {:?} on backend '{}'", id, backend.name());
        Self {
            id,
            backend,
            active_program: None,
            bound_vertex_array: None,
            stats: ResourceStats::default(),
        }
    }

    /// Context over a recording [`DummyBackend`].
    pub fn dummy() -> Self {
        Self::new(Box::new(DummyBackend::new()))
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn backend(&self) -> &dyn GlBackend {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> &mut dyn GlBackend {
        self.backend.as_mut()
    }

    /// The recording backend, if this context runs on one.
    pub fn dummy_backend(&self) -> Option<&DummyBackend> {
        self.backend.as_any().downcast_ref()
    }

    pub fn dummy_backend_mut(&mut self) -> Option<&mut DummyBackend> {
        self.backend.as_any_mut().downcast_mut()
    }

    pub fn stats(&self) -> ResourceStats {
        self.stats
    }

    /// The program binding published by the last `use_program`.
    pub fn active_program(&self) -> Option<&ProgramBinding> {
        self.active_program.as_ref()
    }

    pub(crate) fn set_active_program(&mut self, binding: ProgramBinding) {
        self.active_program = Some(binding);
    }

    /// Drop the cached binding if it belongs to program `instance`.
    pub(crate) fn clear_active_program(&mut self, instance: u64) {
        if self
            .active_program
            .as_ref()
            .map(|b| b.instance == instance)
            .unwrap_or(false)
        {
            self.backend.use_program(None);
            self.active_program = None;
        }
    }

    /// Bind `vao` unless it is already bound. Returns whether a backend
    /// call was issued.
    pub(crate) fn bind_vertex_array(&mut self, vao: VertexArrayHandle) -> bool {
        if self.bound_vertex_array == Some(vao) {
            return false;
        }
        self.backend.bind_vertex_array(Some(vao));
        self.bound_vertex_array = Some(vao);
        true
    }

    pub(crate) fn unbind_vertex_array(&mut self) {
        if self.bound_vertex_array.is_some() {
            self.backend.bind_vertex_array(None);
            self.bound_vertex_array = None;
        }
    }

    /// Forget a deleted vertex array; unbinds it first if current.
    pub(crate) fn forget_vertex_array(&mut self, vao: VertexArrayHandle) {
        if self.bound_vertex_array == Some(vao) {
            self.unbind_vertex_array();
        }
    }

    /// Fail unless `owner`, captured at first bind, is this context.
    pub(crate) fn check_owner(
        &self,
        owner: Option<ContextId>,
        what: &str,
    ) -> Result<(), GraphicsError> {
        match owner {
            None => Ok(()),
            Some(id) if id == self.id => Ok(()),
            Some(id) => Err(GraphicsError::ContextMismatch(format!(
                "{} belongs to {:?}, used with {:?}",
                what, id, self.id
            ))),
        }
    }

    pub(crate) fn note_buffer_created(&mut self) {
        self.stats.buffers.created += 1;
    }

    pub(crate) fn note_buffer_destroyed(&mut self) {
        self.stats.buffers.destroyed += 1;
    }

    pub(crate) fn note_program_created(&mut self) {
        self.stats.programs.created += 1;
    }

    pub(crate) fn note_program_destroyed(&mut self) {
        self.stats.programs.destroyed += 1;
    }

    pub(crate) fn note_vertex_array_created(&mut self) {
        self.stats.vertex_arrays.created += 1;
    }

    pub(crate) fn note_vertex_array_destroyed(&mut self) {
        self.stats.vertex_arrays.destroyed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = Context::dummy();
        let b = Context::dummy();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn vertex_array_binding_is_cached() {
        let mut ctx = Context::dummy();
        let vao = ctx.backend_mut().create_vertex_array().unwrap();
        assert!(ctx.bind_vertex_array(vao));
        assert!(!ctx.bind_vertex_array(vao));
        ctx.unbind_vertex_array();
        assert!(ctx.bind_vertex_array(vao));
    }

    #[test]
    fn owner_check_rejects_foreign_context() {
        let a = Context::dummy();
        let b = Context::dummy();
        assert!(a.check_owner(None, "buffer").is_ok());
        assert!(a.check_owner(Some(a.id()), "buffer").is_ok());
        assert!(matches!(
            a.check_owner(Some(b.id()), "buffer"),
            Err(GraphicsError::ContextMismatch(_))
        ));
    }
}
