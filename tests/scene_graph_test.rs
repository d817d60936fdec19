use std::{cell::RefCell, rc::Rc, time::Duration};

use ar_ngin::{
    SceneTraversal,
    cgmath::{Deg, Matrix4, Vector3},
    data_structures::{
        geometry::Geometry,
        mesh::ProceduralShape,
        scene_graph::{Node, Scene},
        transform::Transform,
    },
    tracking::{Anchor, AnchorEvent, AnchorKind, PlaneGeometryData},
};

fn cube() -> Geometry {
    Geometry::from_shape(ProceduralShape::Cube)
}

#[test]
fn should_compose_world_transform_through_ancestors() {
    let mut scene = Scene::new();
    let root = scene.root();
    scene.node_mut(root).unwrap().transform =
        Transform::from_translation(Vector3::new(1.0, 0.0, 0.0));
    let a = scene
        .add_child(root, Node::named("A").with_transform(Vector3::new(0.0, 1.0, 0.0)))
        .unwrap();
    let b = scene
        .add_child(a, Node::named("B").with_transform(Transform::identity()))
        .unwrap();

    let world = scene.world_transform(b).unwrap();
    assert_eq!(world.translation(), Vector3::new(1.0, 1.0, 0.0));
    assert_eq!(scene.node(b).unwrap().parent(), Some(a));
}

#[test]
fn should_apply_local_transform_before_parent_transform() {
    let mut scene = Scene::new();
    let root = scene.root();
    // parent rotates a quarter turn about z, the child sits one unit along x
    let parent = scene
        .add_child(
            root,
            Node::named("parent").with_transform(Matrix4::from_angle_z(Deg(90.0))),
        )
        .unwrap();
    let child = scene
        .add_child(parent, Node::named("child").with_transform(Vector3::new(1.0, 0.0, 0.0)))
        .unwrap();

    let world = scene.world_transform(child).unwrap();
    let t = world.translation();
    // parent * local puts the child on +y; local * parent would leave it on +x
    assert!(t.x.abs() < 1e-5, "{:?}", t);
    assert!((t.y - 1.0).abs() < 1e-5, "{:?}", t);
    let expected = Matrix4::from_angle_z(Deg(90.0))
        * Matrix4::from_translation(Vector3::new(1.0, 0.0, 0.0));
    assert_eq!(world.matrix, expected);
}

#[test]
fn should_detach_whole_subtree_on_remove() {
    let mut scene = Scene::new();
    let root = scene.root();
    let a = scene.add_child(root, Node::named("A")).unwrap();
    let b = scene.add_child(a, Node::named("B")).unwrap();

    let detached = scene.remove_from_parent(a).unwrap();
    assert_eq!(detached.len(), 2);
    assert!(!scene.contains(a));
    assert!(!scene.contains(b));
    assert!(scene.find_child(root, "B", true).is_none());
    assert!(scene.node(root).unwrap().children().is_empty());

    let reattached = scene.attach(root, detached).unwrap();
    assert_eq!(scene.find_child(root, "A", false), Some(reattached));
    assert!(scene.find_child(reattached, "B", false).is_some());
}

#[test]
fn should_not_remove_the_root() {
    let mut scene = Scene::new();
    let root = scene.root();
    assert!(scene.remove_from_parent(root).is_none());
    assert!(scene.contains(root));
}

#[test]
fn should_only_search_direct_children_without_recursion() {
    let mut scene = Scene::new();
    let root = scene.root();
    let a = scene.add_child(root, Node::named("A")).unwrap();
    let b = scene.add_child(a, Node::named("B")).unwrap();

    assert_eq!(scene.find_child(root, "B", false), None);
    assert_eq!(scene.find_child(root, "B", true), Some(b));
}

#[test]
fn should_prefer_shallow_matches_in_insertion_order() {
    let mut scene = Scene::new();
    let root = scene.root();
    let a = scene.add_child(root, Node::named("A")).unwrap();
    scene.add_child(a, Node::named("target")).unwrap();
    let shallow = scene.add_child(root, Node::named("target")).unwrap();
    scene.add_child(root, Node::named("target")).unwrap();

    assert_eq!(scene.find_child(root, "target", true), Some(shallow));
}

#[test]
fn should_insert_children_at_index() {
    let mut scene = Scene::new();
    let root = scene.root();
    let x = scene.add_child(root, Node::named("x")).unwrap();
    let y = scene.add_child(root, Node::named("y")).unwrap();
    let z = scene.insert_child(root, 0, Node::named("z")).unwrap();
    let w = scene.insert_child(root, 99, Node::named("w")).unwrap();

    assert_eq!(scene.node(root).unwrap().children(), &[z, x, y, w]);
}

#[test]
fn should_run_behaviours_parents_before_children() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let recorder = |name: &'static str| {
        let log = log.clone();
        move |_: &mut Node, _: Duration| log.borrow_mut().push(name)
    };

    let mut scene = Scene::new();
    let root = scene.root();
    let a = scene
        .add_child(root, Node::named("A").with_behaviour(recorder("A")))
        .unwrap();
    scene
        .add_child(a, Node::named("B").with_behaviour(recorder("B")))
        .unwrap();
    scene
        .add_child(root, Node::named("C").with_behaviour(recorder("C")))
        .unwrap();

    scene.update(Duration::from_millis(66));
    assert_eq!(*log.borrow(), vec!["A", "B", "C"]);
}

#[test]
fn should_let_behaviours_move_their_node() {
    let mut scene = Scene::new();
    let root = scene.root();
    let spinner = scene
        .add_child(
            root,
            Node::new().with_behaviour(|node: &mut Node, delta: Duration| {
                let mut translation = node.transform.translation();
                translation.x += delta.as_secs_f32();
                node.transform.set_translation(translation);
            }),
        )
        .unwrap();

    scene.update(Duration::from_secs(1));
    scene.update(Duration::from_secs(1));
    assert_eq!(
        scene.node(spinner).unwrap().transform.translation(),
        Vector3::new(2.0, 0.0, 0.0)
    );
}

#[test]
fn should_order_draw_list_by_traversal() {
    let mut scene = Scene::new();
    let root = scene.root();
    let a = scene.add_child(root, Node::named("A").with_geometry(cube())).unwrap();
    let b = scene.add_child(a, Node::named("B").with_geometry(cube())).unwrap();
    let c = scene.add_child(root, Node::named("C").with_geometry(cube())).unwrap();
    let eye = scene.add_child(root, Node::named("eye")).unwrap();

    assert_eq!(
        scene.draw_list(eye, SceneTraversal::BreadthFirst),
        vec![a, c, b]
    );
    assert_eq!(
        scene.draw_list(eye, SceneTraversal::ChildrenFirst),
        vec![b, a, c]
    );
}

#[test]
fn should_treat_every_node_as_inside_the_frustum() {
    let mut scene = Scene::new();
    let root = scene.root();
    let a = scene.add_child(root, Node::new().with_geometry(cube())).unwrap();
    assert!(scene.is_node_inside_frustum(a, root));
    assert!(scene.nodes_inside_frustum(root).is_empty());
}

fn point_anchor(id: u64, x: f32) -> Anchor {
    Anchor {
        id,
        transform: Matrix4::from_translation(Vector3::new(x, 0.0, 0.0)),
        kind: AnchorKind::Point,
    }
}

#[test]
fn should_mirror_point_anchor_lifecycle() {
    let mut scene = Scene::new();
    scene.set_point_anchor_content(|_| Some(Node::named("content").with_geometry(cube())));

    scene.apply_anchor_event(AnchorEvent::Added(point_anchor(7, 1.0)));
    let node = scene.anchor_node(7).unwrap();
    assert_eq!(scene.node(node).unwrap().parent(), Some(scene.root()));
    assert!(scene.find_child(node, "content", false).is_some());

    scene.apply_anchor_event(AnchorEvent::Updated(point_anchor(7, 3.0)));
    assert_eq!(
        scene.node(node).unwrap().transform.translation(),
        Vector3::new(3.0, 0.0, 0.0)
    );

    scene.apply_anchor_event(AnchorEvent::Removed(7));
    assert!(scene.anchor_node(7).is_none());
    assert!(!scene.contains(node));
    assert_eq!(scene.len(), 1);
}

#[test]
fn should_give_plane_anchors_plane_geometry() {
    let mut scene = Scene::new();
    let plane = PlaneGeometryData {
        vertices: vec![[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]],
        tex_coords: vec![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0]],
        indices: vec![0, 1, 2],
    };
    scene.apply_anchor_event(AnchorEvent::Added(Anchor {
        id: 1,
        transform: Matrix4::from_scale(1.0),
        kind: AnchorKind::Plane(plane),
    }));

    let node = scene.anchor_node(1).unwrap();
    assert!(scene.node(node).unwrap().geometry.is_some());
}

#[test]
fn should_ignore_updates_for_unknown_anchors() {
    let mut scene = Scene::new();
    scene.apply_anchor_event(AnchorEvent::Updated(point_anchor(3, 1.0)));
    scene.apply_anchor_event(AnchorEvent::Removed(3));
    assert_eq!(scene.len(), 1);
}
