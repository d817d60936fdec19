//! Scene graph and hierarchical scene organization.
//!
//! All nodes of a [`Scene`] live in one generational arena. Parent to child edges are
//! the only ownership: a node is owned by the scene as long as it hangs below the root,
//! and [`Scene::remove_from_parent`] hands the whole subtree back as an owned
//! [`Detached`] value. Parents are referenced by [`NodeId`] only, so a stale handle
//! resolves to `None` instead of keeping anything alive.

use std::collections::{HashMap, VecDeque};

use generational_arena::{Arena, Index};
use instant::Duration;

use crate::{
    camera::Camera,
    config::SceneTraversal,
    data_structures::{geometry::Geometry, transform::Transform},
    tracking::{Anchor, AnchorEvent, AnchorId, AnchorKind},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(Index);

/// Per-frame logic attached to a node, e.g. an animation.
pub trait Behaviour {
    fn update(&mut self, node: &mut Node, delta: Duration);
}

impl<F> Behaviour for F
where
    F: FnMut(&mut Node, Duration),
{
    fn update(&mut self, node: &mut Node, delta: Duration) {
        self(node, delta)
    }
}

pub struct Node {
    pub name: Option<String>,
    pub transform: Transform,
    pub geometry: Option<Geometry>,
    pub camera: Option<Camera>,
    behaviour: Option<Box<dyn Behaviour>>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("transform", &self.transform)
            .field("geometry", &self.geometry.is_some())
            .field("camera", &self.camera)
            .field("children", &self.children.len())
            .finish()
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl Node {
    pub fn new() -> Self {
        Self {
            name: None,
            transform: Transform::identity(),
            geometry: None,
            camera: None,
            behaviour: None,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new()
        }
    }

    pub fn with_transform(mut self, transform: impl Into<Transform>) -> Self {
        self.transform = transform.into();
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_camera(mut self, camera: Camera) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn with_behaviour(mut self, behaviour: impl Behaviour + 'static) -> Self {
        self.behaviour = Some(Box::new(behaviour));
        self
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// A subtree that was removed from a scene. Dropping it destroys every node in it.
#[derive(Debug)]
pub struct Detached {
    node: Node,
    children: Vec<Detached>,
}

impl Detached {
    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut Node {
        &mut self.node
    }

    /// Number of nodes in the subtree, including its root.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(Detached::len).sum::<usize>()
    }
}

type AnchorContent = Box<dyn FnMut(&Anchor) -> Option<Node>>;

pub struct Scene {
    nodes: Arena<Node>,
    root: NodeId,
    anchors: HashMap<AnchorId, NodeId>,
    point_anchor_content: Option<AnchorContent>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        let mut nodes = Arena::new();
        let root = NodeId(nodes.insert(Node::named("root")));
        Self {
            nodes,
            root,
            anchors: HashMap::new(),
            point_anchor_content: None,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(id.0)
    }

    pub fn add_child(&mut self, parent: NodeId, node: Node) -> Option<NodeId> {
        let index = self.node(parent)?.children.len();
        self.insert_child(parent, index, node)
    }

    /// Inserts `node` at `index` among the children of `parent`. Indices past the end
    /// append.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, mut node: Node) -> Option<NodeId> {
        if !self.contains(parent) {
            log::warn!("insert_child on a removed parent {:?}", parent);
            return None;
        }
        node.parent = Some(parent);
        node.children.clear();
        let id = NodeId(self.nodes.insert(node));
        let siblings = &mut self.nodes.get_mut(parent.0)?.children;
        let at = index.min(siblings.len());
        siblings.insert(at, id);
        Some(id)
    }

    /// Detaches `id` and its descendants. The root cannot be removed.
    pub fn remove_from_parent(&mut self, id: NodeId) -> Option<Detached> {
        let parent = self.node(id)?.parent?;
        if let Some(parent) = self.nodes.get_mut(parent.0) {
            parent.children.retain(|child| *child != id);
        }
        let detached = self.take_subtree(id);
        if detached.is_some() {
            self.anchors.retain(|_, node| self.nodes.contains(node.0));
        }
        detached
    }

    fn take_subtree(&mut self, id: NodeId) -> Option<Detached> {
        let mut node = self.nodes.remove(id.0)?;
        node.parent = None;
        let children = std::mem::take(&mut node.children)
            .into_iter()
            .filter_map(|child| self.take_subtree(child))
            .collect();
        Some(Detached { node, children })
    }

    /// Re-attaches a detached subtree below `parent`. Node ids are not preserved.
    pub fn attach(&mut self, parent: NodeId, subtree: Detached) -> Option<NodeId> {
        let Detached { node, children } = subtree;
        let id = self.add_child(parent, node)?;
        for child in children {
            self.attach(id, child);
        }
        Some(id)
    }

    /// Breadth-first search below `parent`: direct children first, first match in
    /// insertion order. Without `recursive` only direct children are looked at.
    pub fn find_child(&self, parent: NodeId, name: &str, recursive: bool) -> Option<NodeId> {
        let mut candidates: VecDeque<NodeId> = self.node(parent)?.children.iter().copied().collect();
        while let Some(candidate) = candidates.pop_front() {
            let Some(node) = self.node(candidate) else {
                continue;
            };
            if node.name.as_deref() == Some(name) {
                return Some(candidate);
            }
            if recursive {
                candidates.extend(node.children.iter().copied());
            }
        }
        None
    }

    /// `parent.world * local`, recomputed on every call.
    pub fn world_transform(&self, id: NodeId) -> Option<Transform> {
        let node = self.node(id)?;
        let mut world = node.transform;
        let mut current = node.parent;
        while let Some(parent) = current.and_then(|p| self.node(p)) {
            world = parent.transform * world;
            current = parent.parent;
        }
        Some(world)
    }

    /// Every node with geometry, breadth-first from the root.
    ///
    /// The point of view does not scope the walk: the whole tree is visited. Culling is
    /// not implemented either, see [`Scene::is_node_inside_frustum`].
    pub fn visible_nodes(&self, _point_of_view: NodeId) -> Vec<NodeId> {
        let mut nodes = Vec::new();
        let mut queue = VecDeque::from([self.root]);
        while let Some(id) = queue.pop_front() {
            let Some(node) = self.node(id) else {
                continue;
            };
            if node.geometry.is_some() {
                nodes.push(id);
            }
            queue.extend(node.children.iter().copied());
        }
        nodes
    }

    /// Drawable nodes with every node's children before the node itself.
    pub fn render_order(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        // (node, children already pushed)
        let mut stack = vec![(self.root, false)];
        while let Some((id, expanded)) = stack.pop() {
            let Some(node) = self.node(id) else {
                continue;
            };
            if expanded {
                if node.geometry.is_some() {
                    order.push(id);
                }
                continue;
            }
            stack.push((id, true));
            stack.extend(node.children.iter().rev().map(|child| (*child, false)));
        }
        order
    }

    pub fn draw_list(&self, point_of_view: NodeId, traversal: SceneTraversal) -> Vec<NodeId> {
        match traversal {
            SceneTraversal::BreadthFirst => self.visible_nodes(point_of_view),
            SceneTraversal::ChildrenFirst => self.render_order(),
        }
    }

    /// Not implemented: every node counts as inside.
    pub fn is_node_inside_frustum(&self, _node: NodeId, _point_of_view: NodeId) -> bool {
        true
    }

    /// Not implemented: always empty.
    pub fn nodes_inside_frustum(&self, _point_of_view: NodeId) -> Vec<NodeId> {
        Vec::new()
    }

    /// Runs every node's behaviour, depth-first, parents before their children.
    pub fn update(&mut self, delta: Duration) {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get_mut(id.0) else {
                continue;
            };
            if let Some(mut behaviour) = node.behaviour.take() {
                behaviour.update(node, delta);
                node.behaviour = Some(behaviour);
            }
            stack.extend(node.children.iter().rev().copied());
        }
    }

    /// Content attached below every newly added point anchor.
    pub fn set_point_anchor_content(&mut self, content: impl FnMut(&Anchor) -> Option<Node> + 'static) {
        self.point_anchor_content = Some(Box::new(content));
    }

    pub fn anchor_node(&self, anchor: AnchorId) -> Option<NodeId> {
        self.anchors.get(&anchor).copied()
    }

    /// Mirrors a tracking anchor change into the graph. Anchor nodes hang directly
    /// below the root; plane anchors carry plane geometry.
    pub fn apply_anchor_event(&mut self, event: AnchorEvent) {
        match event {
            AnchorEvent::Added(anchor) => {
                if self.anchors.contains_key(&anchor.id) {
                    log::debug!("anchor {} added twice, treating as update", anchor.id);
                    return self.apply_anchor_event(AnchorEvent::Updated(anchor));
                }
                let mut node = Node::named(format!("anchor-{}", anchor.id))
                    .with_transform(anchor.transform);
                if let AnchorKind::Plane(plane) = &anchor.kind {
                    node.geometry = plane_geometry(anchor.id, plane, None);
                }
                let Some(id) = self.add_child(self.root, node) else {
                    return;
                };
                self.anchors.insert(anchor.id, id);
                if let AnchorKind::Point = anchor.kind {
                    let content = self.point_anchor_content.as_mut().and_then(|f| f(&anchor));
                    if let Some(content) = content {
                        self.add_child(id, content);
                    }
                }
            }
            AnchorEvent::Updated(anchor) => {
                let Some(node) = self
                    .anchor_node(anchor.id)
                    .and_then(|id| self.nodes.get_mut(id.0))
                else {
                    log::debug!("update for unknown anchor {}", anchor.id);
                    return;
                };
                node.transform = anchor.transform.into();
                if let AnchorKind::Plane(plane) = &anchor.kind {
                    let texture = node
                        .geometry
                        .as_ref()
                        .and_then(|g| g.texture().map(str::to_string));
                    if let Some(geometry) = plane_geometry(anchor.id, plane, texture) {
                        node.geometry = Some(geometry);
                    }
                }
            }
            AnchorEvent::Removed(anchor) => {
                if let Some(id) = self.anchors.remove(&anchor) {
                    drop(self.remove_from_parent(id));
                }
            }
        }
    }
}

fn plane_geometry(
    anchor: AnchorId,
    plane: &crate::tracking::PlaneGeometryData,
    texture: Option<String>,
) -> Option<Geometry> {
    match Geometry::plane(&plane.vertices, &plane.tex_coords, &plane.indices) {
        Ok(mut geometry) => {
            if let Some(texture) = texture {
                geometry.set_texture(texture);
            }
            Some(geometry)
        }
        Err(e) => {
            log::warn!("plane anchor {} has unusable geometry: {}", anchor, e);
            None
        }
    }
}
