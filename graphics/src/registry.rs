//! Named geometry storage.
//!
//! A [`GeometryRegistry`] keeps vertex arrays by name so scene code can
//! share geometry without owning it, and releases everything in one
//! sweep on shutdown.

use std::collections::HashMap;

use crate::context::Context;
use crate::vertex_array::VertexArray;

#[derive(Default)]
pub struct GeometryRegistry {
    entries: HashMap<String, VertexArray>,
}

impl GeometryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register geometry under `name`, returning the replaced entry if
    /// one existed. The replaced entry still owns its device objects;
    /// dispose it unless that is intended.
    pub fn insert(&mut self, name: impl Into<String>, geometry: VertexArray) -> Option<VertexArray> {
        self.entries.insert(name.into(), geometry)
    }

    pub fn get(&self, name: &str) -> Option<&VertexArray> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut VertexArray> {
        self.entries.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<VertexArray> {
        self.entries.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Dispose and drop every entry.
    pub fn dispose_all(&mut self, ctx: &mut Context) {
        for (name, mut geometry) in self.entries.drain() {
            log::trace!("disposing geometry '{}'", name);
            geometry.dispose(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Indices;
    use crate::vertex_array::VertexArrayDescriptor;

    fn triangle() -> VertexArray {
        VertexArray::new(
            VertexArrayDescriptor::new()
                .with_position(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0])
                .with_indices(Indices::Auto(vec![0, 1, 2])),
        )
    }

    #[test]
    fn insert_get_remove() {
        let mut registry = GeometryRegistry::new();
        assert!(registry.insert("tri", triangle()).is_none());
        assert!(registry.contains("tri"));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("tri").is_some());
        assert!(registry.insert("tri", triangle()).is_some());
        assert!(registry.remove("tri").is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn dispose_all_releases_device_objects() {
        let mut ctx = Context::dummy();
        let mut registry = GeometryRegistry::new();
        registry.insert("a", triangle());
        registry.insert("b", triangle());
        registry.get_mut("a").unwrap().bind(&mut ctx).unwrap();
        registry.get_mut("b").unwrap().bind(&mut ctx).unwrap();
        assert_eq!(ctx.stats().live_vertex_arrays(), 2);
        registry.dispose_all(&mut ctx);
        assert!(registry.is_empty());
        assert_eq!(ctx.stats().live_vertex_arrays(), 0);
        assert_eq!(ctx.stats().live_buffers(), 0);
    }
}
