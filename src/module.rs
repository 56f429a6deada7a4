//! The contract between the host and a scene module.
//!
//! A scene module is a mount function. It receives a [`SceneContext`],
//! builds whatever it needs under the content root, and returns a
//! [`Teardown`] that undoes all of it, or `None` if it left nothing behind.
//! The host runs the teardown before the next module mounts.
//!
//! Modules are looked up by [`SceneId`] in a [`ModuleRegistry`] built at
//! startup.
//!
//! # Example
//! ```ignore
//! fn mount(ctx: &mut SceneContext<'_>) -> Result<Option<Teardown>, MountError> {
//!     let cube = ctx.graph.spawn_visual(
//!         ctx.content_root,
//!         "cube",
//!         Transform::new(),
//!         Visual::new(Shape::Cube, Color::WHITE),
//!     )?;
//!     Ok(Some(Box::new(move |ctx: &mut SceneContext<'_>| {
//!         let _ = ctx.graph.despawn(cube);
//!     })))
//! }
//!
//! let mut registry = ModuleRegistry::new();
//! registry.register("010", mount);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::ambient::Backdrop;
use crate::camera::Camera;
use crate::effects::EffectRegistry;
use crate::error::{LoadError, MountError};
use crate::override_slot::RenderOverrideSlot;
use crate::render::{RenderState, Renderer};
use crate::resize::ViewportSize;
use crate::scene_graph::{NodeId, SceneGraph};

/// Name of a scene module, like `"002"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneId(String);

impl SceneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SceneId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SceneId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a module may use while mounting and tearing down.
///
/// Anything the module changes through this context belongs to it and must
/// be put back by its teardown.
pub struct SceneContext<'a> {
    pub graph: &'a mut SceneGraph,
    /// The node the module builds under. Empty when the module mounts.
    pub content_root: NodeId,
    pub camera: &'a mut Camera,
    pub render_state: &'a mut RenderState,
    /// For allocating and releasing offscreen targets.
    pub renderer: &'a mut dyn Renderer,
    pub override_slot: &'a mut RenderOverrideSlot,
    /// Per-frame animations, ticked only while a module is mounted.
    pub animations: &'a mut EffectRegistry,
    /// Seconds since the host started.
    pub clock: f32,
    /// The host's decoration. Nodes may be moved, not despawned.
    pub backdrop: &'a Backdrop,
    pub viewport: ViewportSize,
}

/// Undoes one mount.
pub type Teardown = Box<dyn FnOnce(&mut SceneContext<'_>)>;

/// Mounts one scene module.
pub type SceneModule = Rc<dyn Fn(&mut SceneContext<'_>) -> Result<Option<Teardown>, MountError>>;

/// Explicit map from scene id to module.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<SceneId, SceneModule>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module. A later registration under the same id replaces it.
    pub fn register(
        &mut self,
        id: impl Into<SceneId>,
        module: impl Fn(&mut SceneContext<'_>) -> Result<Option<Teardown>, MountError> + 'static,
    ) -> &mut Self {
        let id = id.into();
        if self.modules.insert(id.clone(), Rc::new(module)).is_some() {
            log::warn!("scene module `{id}` registered twice; keeping the newer one");
        }
        self
    }

    pub fn resolve(&self, id: &SceneId) -> Result<SceneModule, LoadError> {
        self.modules
            .get(id)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(id.clone()))
    }

    pub fn contains(&self, id: &SceneId) -> bool {
        self.modules.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &SceneId> {
        self.modules.keys()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.modules.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_ids_do_not_resolve() {
        let mut registry = ModuleRegistry::new();
        registry.register("001", |_| Ok(None));
        assert!(registry.resolve(&SceneId::from("001")).is_ok());
        assert_eq!(
            registry.resolve(&SceneId::from("999")).err(),
            Some(LoadError::NotFound(SceneId::from("999")))
        );
    }

    #[test]
    fn ids_are_listed_in_order() {
        let mut registry = ModuleRegistry::new();
        registry
            .register("003", |_| Ok(None))
            .register("001", |_| Ok(None));
        let ids: Vec<&str> = registry.ids().map(SceneId::as_str).collect();
        assert_eq!(ids, vec!["001", "003"]);
    }
}
