use ar_ngin::{
    FrameSkip, SceneTraversal,
    camera::Camera,
    cgmath::{Deg, Matrix4, Point3, Vector3},
    compositor::{
        plan::{FrameInputs, PassPlan, plan_frame},
        tracked_local_pose,
    },
    data_structures::{
        geometry::Geometry,
        mesh::ProceduralShape,
        scene_graph::{Node, NodeId, Scene},
        uniforms::FrameUniforms,
    },
};

fn inputs(scene: Option<&Scene>, point_of_view: Option<NodeId>) -> FrameInputs<'_> {
    FrameInputs {
        scene,
        point_of_view,
        has_render_target: true,
        has_camera_image: true,
        traversal: SceneTraversal::BreadthFirst,
        clear_colour: ar_ngin::wgpu::Color::TRANSPARENT,
    }
}

fn scene_with_eye() -> (Scene, NodeId) {
    let mut scene = Scene::new();
    let root = scene.root();
    let eye = scene
        .add_child(
            root,
            Node::named("eye")
                .with_camera(Camera::perspective(Deg(60.0), 1.5, 0.01, 100.0))
                .with_transform(Vector3::new(0.0, 0.0, -3.0)),
        )
        .unwrap();
    (scene, eye)
}

#[test]
fn should_skip_without_scene_and_plan_nothing() {
    let result = plan_frame(&inputs(None, None));
    assert_eq!(result, Err(FrameSkip::NoScene));
}

#[test]
fn should_skip_when_point_of_view_was_removed() {
    let (mut scene, eye) = scene_with_eye();
    drop(scene.remove_from_parent(eye));
    assert_eq!(
        plan_frame(&inputs(Some(&scene), Some(eye))),
        Err(FrameSkip::NoPointOfView)
    );
}

#[test]
fn should_plan_scene_pass_then_composite_pass() {
    let (mut scene, eye) = scene_with_eye();
    let root = scene.root();
    scene
        .add_child(
            root,
            Node::named("cube").with_geometry(Geometry::from_shape(ProceduralShape::Cube)),
        )
        .unwrap();

    let plan = plan_frame(&inputs(Some(&scene), Some(eye))).unwrap();
    assert_eq!(plan.passes.len(), 2);
    match &plan.passes[0] {
        PassPlan::Scene {
            clear_depth,
            background,
            draws,
            ..
        } => {
            assert_eq!(*clear_depth, 1.0);
            assert!(*background);
            assert_eq!(draws.len(), 1);
        }
        PassPlan::Composite => panic!("scene pass must come first"),
    }
    assert_eq!(plan.passes[1], PassPlan::Composite);
}

#[test]
fn should_not_request_background_without_camera_image() {
    let (scene, eye) = scene_with_eye();
    let mut no_image = inputs(Some(&scene), Some(eye));
    no_image.has_camera_image = false;

    let plan = plan_frame(&no_image).unwrap();
    assert!(matches!(
        plan.passes[0],
        PassPlan::Scene {
            background: false,
            ..
        }
    ));
    assert_eq!(plan.draw_count(), 0);
}

#[test]
fn should_use_point_of_view_transform_and_camera_projection() {
    let (scene, eye) = scene_with_eye();
    let camera = scene.node(eye).unwrap().camera.unwrap();
    // the eye sits at z = -3, so the world moves by +3 in view space
    let view = Matrix4::from_translation(Vector3::new(0.0, 0.0, 3.0));

    let plan = plan_frame(&inputs(Some(&scene), Some(eye))).unwrap();
    assert_eq!(plan.point_of_view, eye);
    assert_eq!(plan.projection, camera.projection);
    assert_eq!(plan.frame_uniforms, FrameUniforms::new(view, camera.projection));
}

#[test]
fn should_draw_world_matrices_in_traversal_order() {
    let (mut scene, eye) = scene_with_eye();
    let root = scene.root();
    let parent = scene
        .add_child(
            root,
            Node::named("parent")
                .with_geometry(Geometry::from_shape(ProceduralShape::Quad))
                .with_transform(Vector3::new(1.0, 0.0, 0.0)),
        )
        .unwrap();
    let child = scene
        .add_child(
            parent,
            Node::named("child")
                .with_geometry(Geometry::from_shape(ProceduralShape::Triangle))
                .with_transform(Vector3::new(0.0, 1.0, 0.0)),
        )
        .unwrap();

    let mut children_first = inputs(Some(&scene), Some(eye));
    children_first.traversal = SceneTraversal::ChildrenFirst;
    let plan = plan_frame(&children_first).unwrap();
    let draws: Vec<_> = plan.draws().collect();
    assert_eq!(draws[0].node, child);
    assert_eq!(draws[1].node, parent);
    assert_eq!(
        draws[0].model,
        Matrix4::from_translation(Vector3::new(1.0, 1.0, 0.0))
    );
    // instance entries follow draw order
    assert_eq!(draws[0].first_instance, 0);
    assert_eq!(draws[1].first_instance, 1);
}

#[test]
fn should_view_from_tracked_pose_below_transformed_parent() {
    let mut scene = Scene::new();
    let root = scene.root();
    let rig = scene
        .add_child(
            root,
            Node::named("rig").with_transform(
                Matrix4::from_translation(Vector3::new(5.0, 0.0, 0.0))
                    * Matrix4::from_angle_y(Deg(30.0)),
            ),
        )
        .unwrap();
    let eye = scene
        .add_child(rig, Node::named("eye").with_camera(Camera::default()))
        .unwrap();
    let view = Matrix4::look_at_rh(
        Point3::new(0.0, 1.0, 2.0),
        Point3::new(0.0, 0.0, 0.0),
        Vector3::unit_y(),
    );

    scene.node_mut(eye).unwrap().transform = tracked_local_pose(&scene, eye, view).unwrap();
    let plan = plan_frame(&inputs(Some(&scene), Some(eye))).unwrap();

    let expected: [[f32; 4]; 4] = view.into();
    for (planned, expected) in plan.frame_uniforms.view.iter().zip(expected.iter()) {
        for (a, b) in planned.iter().zip(expected) {
            assert!((a - b).abs() < 1e-4, "{:?} != {:?}", plan.frame_uniforms.view, expected);
        }
    }
}

#[test]
fn should_skip_point_of_view_with_degenerate_pose() {
    let (mut scene, eye) = scene_with_eye();
    scene.node_mut(eye).unwrap().transform = Matrix4::from_scale(0.0).into();
    assert_eq!(
        plan_frame(&inputs(Some(&scene), Some(eye))),
        Err(FrameSkip::NoPointOfView)
    );
}

#[test]
fn should_describe_skip_reason_as_error() {
    let reason: Box<dyn std::error::Error> = Box::new(FrameSkip::NoCamera);
    assert_eq!(reason.to_string(), "point-of-view node has no camera");
    assert_eq!(FrameSkip::InFlightLimit.to_string(), "all in-flight frame slots are busy");
}
