//! The shared scene tree, stored in a [`hecs::World`].
//!
//! Every node is an entity carrying a [`Transform`], its parent link and an
//! ordered child list. Nodes with a [`Visual`] are drawn; nodes without one
//! are pure grouping nodes. The host marks its own long-lived nodes (the
//! root, the content root, the backdrop) as protected: they can be moved and
//! restyled by anyone but never despawned.
//!
//! # Example
//! ```ignore
//! let mut graph = SceneGraph::new();
//! let group = graph.spawn(graph.root(), "group", Transform::new())?;
//! let cube = graph.spawn_visual(
//!     group,
//!     "cube",
//!     Transform::from_position(Vec3::Y),
//!     Visual::new(Shape::Cube, Color::WHITE),
//! )?;
//! graph.despawn(group)?; // removes the cube too
//! ```

use glam::Mat4;
use hecs::{Entity, World};

use crate::color::Color;
use crate::error::GraphError;
use crate::mesh::{Shape, Transform};

/// Handle to a node in a [`SceneGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(Entity);

struct Name(String);
struct Parent(Entity);
struct Children(Vec<Entity>);
struct Protected;

/// How a node looks when drawn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Visual {
    pub shape: Shape,
    pub color: Color,
    /// 1.0 is opaque. Anything lower is drawn in the blended pass.
    pub opacity: f32,
    /// Self-illumination added on top of lighting, in multiples of `color`.
    pub emissive: f32,
    /// Hidden nodes hide their whole subtree.
    pub visible: bool,
    /// Exempt from fog, for skybox-like decoration.
    pub fog: bool,
}

impl Visual {
    pub fn new(shape: Shape, color: Color) -> Self {
        Self {
            shape,
            color,
            opacity: 1.0,
            emissive: 0.0,
            visible: true,
            fog: true,
        }
    }

    pub fn opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn emissive(mut self, emissive: f32) -> Self {
        self.emissive = emissive;
        self
    }

    pub fn unfogged(mut self) -> Self {
        self.fog = false;
        self
    }

    pub fn is_transparent(&self) -> bool {
        self.opacity < 1.0
    }
}

/// One drawable node, flattened to world space.
#[derive(Clone, Copy, Debug)]
pub struct DrawItem {
    pub node: NodeId,
    pub world: Mat4,
    pub visual: Visual,
}

pub struct SceneGraph {
    world: World,
    root: NodeId,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    pub fn new() -> Self {
        let mut world = World::new();
        let root = world.spawn((
            Name("scene".to_string()),
            Transform::new(),
            Children(Vec::new()),
            Protected,
        ));
        Self {
            world,
            root: NodeId(root),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.world.contains(node.0)
    }

    /// Number of live nodes, the root included.
    pub fn len(&self) -> usize {
        self.world.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Add a grouping node under `parent`.
    pub fn spawn(
        &mut self,
        parent: NodeId,
        name: &str,
        transform: Transform,
    ) -> Result<NodeId, GraphError> {
        self.attach(parent, (Name(name.to_string()), transform))
    }

    /// Add a drawable node under `parent`.
    pub fn spawn_visual(
        &mut self,
        parent: NodeId,
        name: &str,
        transform: Transform,
        visual: Visual,
    ) -> Result<NodeId, GraphError> {
        self.attach(parent, (Name(name.to_string()), transform, visual))
    }

    fn attach(
        &mut self,
        parent: NodeId,
        components: impl hecs::DynamicBundle,
    ) -> Result<NodeId, GraphError> {
        if !self.contains(parent) {
            return Err(GraphError::NoSuchNode(parent));
        }
        let entity = self.world.spawn(components);
        // Both inserts target an entity spawned above.
        let _ = self
            .world
            .insert(entity, (Parent(parent.0), Children(Vec::new())));
        if let Ok(mut children) = self.world.get::<&mut Children>(parent.0) {
            children.0.push(entity);
        }
        Ok(NodeId(entity))
    }

    pub(crate) fn protect(&mut self, node: NodeId) -> Result<(), GraphError> {
        self.world
            .insert_one(node.0, Protected)
            .map_err(|_| GraphError::NoSuchNode(node))
    }

    pub fn is_protected(&self, node: NodeId) -> bool {
        self.world.get::<&Protected>(node.0).is_ok()
    }

    pub fn name(&self, node: NodeId) -> Option<String> {
        self.world.get::<&Name>(node.0).ok().map(|n| n.0.clone())
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.world.get::<&Parent>(node.0).ok().map(|p| NodeId(p.0))
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.world
            .get::<&Children>(node.0)
            .map(|c| c.0.iter().copied().map(NodeId).collect())
            .unwrap_or_default()
    }

    pub fn child_count(&self, node: NodeId) -> usize {
        self.world
            .get::<&Children>(node.0)
            .map(|c| c.0.len())
            .unwrap_or(0)
    }

    /// True if `ancestor` lies on the parent chain of `node`.
    pub fn is_descendant_of(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.parent(node);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent(parent);
        }
        false
    }

    pub fn transform(&self, node: NodeId) -> Option<Transform> {
        self.world.get::<&Transform>(node.0).ok().map(|t| *t)
    }

    pub fn set_transform(&mut self, node: NodeId, transform: Transform) -> Result<(), GraphError> {
        self.update_transform(node, |t| *t = transform)
    }

    pub fn update_transform(
        &mut self,
        node: NodeId,
        f: impl FnOnce(&mut Transform),
    ) -> Result<(), GraphError> {
        let mut transform = self
            .world
            .get::<&mut Transform>(node.0)
            .map_err(|_| GraphError::NoSuchNode(node))?;
        f(&mut transform);
        Ok(())
    }

    pub fn visual(&self, node: NodeId) -> Option<Visual> {
        self.world.get::<&Visual>(node.0).ok().map(|v| *v)
    }

    pub fn update_visual(
        &mut self,
        node: NodeId,
        f: impl FnOnce(&mut Visual),
    ) -> Result<(), GraphError> {
        let mut visual = self
            .world
            .get::<&mut Visual>(node.0)
            .map_err(|_| GraphError::NoSuchNode(node))?;
        f(&mut visual);
        Ok(())
    }

    fn subtree(&self, node: NodeId) -> Vec<Entity> {
        let mut out = vec![node.0];
        let mut i = 0;
        while i < out.len() {
            if let Ok(children) = self.world.get::<&Children>(out[i]) {
                out.extend(children.0.iter().copied());
            }
            i += 1;
        }
        out
    }

    /// Remove a node and everything below it. Returns the number of nodes removed.
    ///
    /// Fails without removing anything if the subtree holds a protected node.
    pub fn despawn(&mut self, node: NodeId) -> Result<usize, GraphError> {
        if !self.contains(node) {
            return Err(GraphError::NoSuchNode(node));
        }
        let subtree = self.subtree(node);
        if let Some(&protected) = subtree
            .iter()
            .find(|&&e| self.world.get::<&Protected>(e).is_ok())
        {
            return Err(GraphError::Protected(NodeId(protected)));
        }

        if let Some(parent) = self.parent(node)
            && let Ok(mut siblings) = self.world.get::<&mut Children>(parent.0)
        {
            siblings.0.retain(|&e| e != node.0);
        }
        for entity in &subtree {
            let _ = self.world.despawn(*entity);
        }
        Ok(subtree.len())
    }

    /// Despawn every child of `node`. Returns the number of nodes removed.
    pub fn clear_children(&mut self, node: NodeId) -> Result<usize, GraphError> {
        let mut removed = 0;
        for child in self.children(node) {
            removed += self.despawn(child)?;
        }
        Ok(removed)
    }

    pub fn world_matrix(&self, node: NodeId) -> Option<Mat4> {
        let mut matrix = self.transform(node)?.matrix();
        let mut current = self.parent(node);
        while let Some(parent) = current {
            matrix = self.transform(parent)?.matrix() * matrix;
            current = self.parent(parent);
        }
        Some(matrix)
    }

    /// Every visible drawable node with its world matrix, in tree order.
    pub fn draw_list(&self) -> Vec<DrawItem> {
        let mut items = Vec::new();
        let mut stack = vec![(self.root.0, Mat4::IDENTITY)];
        while let Some((entity, parent_matrix)) = stack.pop() {
            let local = self
                .world
                .get::<&Transform>(entity)
                .map(|t| t.matrix())
                .unwrap_or(Mat4::IDENTITY);
            let world = parent_matrix * local;

            if let Ok(visual) = self.world.get::<&Visual>(entity) {
                if !visual.visible {
                    continue;
                }
                if visual.opacity > 0.0 {
                    items.push(DrawItem {
                        node: NodeId(entity),
                        world,
                        visual: *visual,
                    });
                }
            }

            if let Ok(children) = self.world.get::<&Children>(entity) {
                stack.extend(children.0.iter().rev().map(|&c| (c, world)));
            }
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn despawn_removes_subtree_and_detaches() {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        let group = graph.spawn(root, "group", Transform::new()).unwrap();
        graph
            .spawn_visual(group, "a", Transform::new(), Visual::new(Shape::Cube, Color::WHITE))
            .unwrap();
        graph
            .spawn_visual(group, "b", Transform::new(), Visual::new(Shape::Sphere, Color::WHITE))
            .unwrap();

        assert_eq!(graph.despawn(group), Ok(3));
        assert_eq!(graph.child_count(root), 0);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn protected_nodes_survive() {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        let keep = graph.spawn(root, "keep", Transform::new()).unwrap();
        graph.protect(keep).unwrap();

        assert_eq!(graph.despawn(keep), Err(GraphError::Protected(keep)));
        assert_eq!(graph.despawn(root), Err(GraphError::Protected(root)));
        assert!(graph.contains(keep));
    }

    #[test]
    fn world_matrix_composes_parents() {
        let mut graph = SceneGraph::new();
        let parent = graph
            .spawn(graph.root(), "p", Transform::from_position(Vec3::new(1.0, 0.0, 0.0)))
            .unwrap();
        let child = graph
            .spawn(parent, "c", Transform::from_position(Vec3::new(0.0, 2.0, 0.0)))
            .unwrap();
        let m = graph.world_matrix(child).unwrap();
        assert_eq!(m.transform_point3(Vec3::ZERO), Vec3::new(1.0, 2.0, 0.0));
        assert!(graph.is_descendant_of(child, graph.root()));
        assert!(!graph.is_descendant_of(parent, child));
    }

    #[test]
    fn hidden_nodes_hide_their_subtree() {
        let mut graph = SceneGraph::new();
        let mut hidden = Visual::new(Shape::Cube, Color::WHITE);
        hidden.visible = false;
        let parent = graph
            .spawn_visual(graph.root(), "hidden", Transform::new(), hidden)
            .unwrap();
        graph
            .spawn_visual(parent, "child", Transform::new(), Visual::new(Shape::Cube, Color::WHITE))
            .unwrap();
        graph
            .spawn_visual(
                graph.root(),
                "shown",
                Transform::new(),
                Visual::new(Shape::Sphere, Color::WHITE),
            )
            .unwrap();

        let items = graph.draw_list();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].visual.shape, Shape::Sphere);
    }

    #[test]
    fn spawning_under_missing_parent_fails() {
        let mut graph = SceneGraph::new();
        let node = graph.spawn(graph.root(), "gone", Transform::new()).unwrap();
        graph.despawn(node).unwrap();
        assert_eq!(
            graph.spawn(node, "orphan", Transform::new()),
            Err(GraphError::NoSuchNode(node))
        );
    }
}
