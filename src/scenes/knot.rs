use glam::{EulerRot, Quat, Vec3};

use crate::color::Color;
use crate::effects::EffectStatus;
use crate::error::MountError;
use crate::mesh::{Shape, Transform};
use crate::module::{SceneContext, Teardown};
use crate::scene_graph::Visual;

/// A translucent torus knot tumbling above the floor.
pub fn mount(ctx: &mut SceneContext<'_>) -> Result<Option<Teardown>, MountError> {
    let knot = ctx.graph.spawn_visual(
        ctx.content_root,
        "torus-knot",
        Transform::from_position(Vec3::new(0.0, 1.1, 0.0)),
        Visual::new(Shape::TorusKnot, Color::hex(0xb8c4ff)).opacity(0.6),
    )?;

    let spin = ctx.animations.add("torus-knot-spin", move |cx| {
        let t = cx.time;
        let spun = cx.graph.update_transform(knot, |transform| {
            transform.rotation = Quat::from_euler(EulerRot::XYZ, t * 0.3, t * 0.2, 0.0);
        });
        match spun {
            Ok(()) => EffectStatus::Running,
            Err(_) => EffectStatus::Finished,
        }
    });

    Ok(Some(Box::new(move |ctx: &mut SceneContext<'_>| {
        ctx.animations.remove(spin);
        if let Err(err) = ctx.graph.despawn(knot) {
            log::warn!("torus knot teardown: {err}");
        }
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::SceneFixture;

    #[test]
    fn teardown_removes_node_and_animation() {
        let mut fixture = SceneFixture::new();
        let teardown = fixture.mount(mount).unwrap().unwrap();
        assert_eq!(fixture.content_nodes(), 1);
        assert_eq!(fixture.animations.len(), 1);

        fixture.tick(2.0);
        let knot = fixture.graph.children(fixture.content_root)[0];
        let rotation = fixture.graph.transform(knot).unwrap().rotation;
        assert!(rotation.angle_between(Quat::IDENTITY) > 0.1);

        fixture.unmount(teardown);
        assert_eq!(fixture.content_nodes(), 0);
        assert!(fixture.animations.is_empty());
    }
}
