//! Per-frame update closures keyed by id.
//!
//! The host keeps two registries: one for ambient effects that run under
//! every scene module (planet orbits, pointer ripples), and one for the
//! animations of the mounted module. An effect either runs until someone
//! removes it by id, or removes itself by returning
//! [`EffectStatus::Finished`].
//!
//! # Example
//! ```ignore
//! let id = registry.add("spin", move |cx| {
//!     let _ = cx.graph.update_transform(node, |t| {
//!         t.rotation *= Quat::from_rotation_y(cx.dt);
//!     });
//!     EffectStatus::Running
//! });
//! // later, in the module's teardown
//! registry.remove(id);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use crate::camera::Camera;
use crate::render::RenderState;
use crate::scene_graph::SceneGraph;

/// Handle returned by [`EffectRegistry::add`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

/// Whether an effect wants to keep running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectStatus {
    Running,
    /// Deregister after this tick.
    Finished,
}

/// What an effect may touch during one tick.
pub struct FrameContext<'a> {
    pub graph: &'a mut SceneGraph,
    pub camera: &'a mut Camera,
    pub state: &'a mut RenderState,
    /// Seconds since the host started.
    pub time: f32,
    /// Seconds since the previous frame.
    pub dt: f32,
}

type EffectFn = Box<dyn FnMut(&mut FrameContext<'_>) -> EffectStatus>;

struct Entry {
    label: String,
    update: EffectFn,
}

/// Ordered set of per-frame effects. Effects run in registration order.
#[derive(Default)]
pub struct EffectRegistry {
    entries: BTreeMap<EffectId, Entry>,
    next_id: u64,
}

impl EffectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        label: impl Into<String>,
        update: impl FnMut(&mut FrameContext<'_>) -> EffectStatus + 'static,
    ) -> EffectId {
        self.next_id += 1;
        let id = EffectId(self.next_id);
        self.entries.insert(
            id,
            Entry {
                label: label.into(),
                update: Box::new(update),
            },
        );
        id
    }

    /// Returns `false` if the effect was already gone.
    pub fn remove(&mut self, id: EffectId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn contains(&self, id: EffectId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> Vec<EffectId> {
        self.entries.keys().copied().collect()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.entries.values().map(|e| e.label.as_str()).collect()
    }

    /// Remove everything. Returns the number of effects dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Run every effect once and drop the ones that finished.
    pub fn tick(&mut self, cx: &mut FrameContext<'_>) {
        let mut finished = Vec::new();
        for (id, entry) in &mut self.entries {
            if (entry.update)(cx) == EffectStatus::Finished {
                finished.push(*id);
            }
        }
        for id in finished {
            if let Some(entry) = self.entries.remove(&id) {
                log::trace!("effect `{}` finished", entry.label);
            }
        }
    }
}

impl fmt::Debug for EffectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectRegistry")
            .field("effects", &self.labels())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    fn tick(registry: &mut EffectRegistry) {
        let mut graph = SceneGraph::new();
        let mut camera = Camera::new();
        let mut state = RenderState::default();
        registry.tick(&mut FrameContext {
            graph: &mut graph,
            camera: &mut camera,
            state: &mut state,
            time: 0.0,
            dt: 1.0 / 60.0,
        });
    }

    #[test]
    fn finished_effects_deregister_themselves() {
        let mut registry = EffectRegistry::new();
        let runs = Rc::new(Cell::new(0));
        let counter = Rc::clone(&runs);
        let id = registry.add("three-shot", move |_| {
            counter.set(counter.get() + 1);
            if counter.get() == 3 {
                EffectStatus::Finished
            } else {
                EffectStatus::Running
            }
        });
        for _ in 0..5 {
            tick(&mut registry);
        }
        assert_eq!(runs.get(), 3);
        assert!(!registry.contains(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn removed_effects_stop_running() {
        let mut registry = EffectRegistry::new();
        let runs = Rc::new(Cell::new(0));
        let counter = Rc::clone(&runs);
        let id = registry.add("forever", move |_| {
            counter.set(counter.get() + 1);
            EffectStatus::Running
        });
        tick(&mut registry);
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        tick(&mut registry);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn effects_run_in_registration_order() {
        let mut registry = EffectRegistry::new();
        let order = Rc::new(std::cell::RefCell::new(Vec::new()));
        for name in ["a", "b", "c"] {
            let order = Rc::clone(&order);
            registry.add(name, move |_| {
                order.borrow_mut().push(name);
                EffectStatus::Running
            });
        }
        tick(&mut registry);
        assert_eq!(*order.borrow(), vec!["a", "b", "c"]);
        assert_eq!(registry.labels(), vec!["a", "b", "c"]);
    }
}
