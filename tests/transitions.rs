//! Transition strategies as seen from the host: selection, overlay output,
//! frame captures and timing.

use vitrine::render::RenderCall;
use vitrine::*;

const FRAME: f64 = 1.0 / 60.0;

fn host(config: HostConfig) -> RenderHost<HeadlessRenderer> {
    let mut modules = ModuleRegistry::new();
    for id in ["001", "002"] {
        modules.register(id, move |ctx: &mut SceneContext<'_>| {
            ctx.graph.spawn_visual(
                ctx.content_root,
                id,
                Transform::new(),
                Visual::new(Shape::Sphere, Color::hex(0xff8844)),
            )?;
            Ok(None)
        });
    }
    RenderHost::new(
        HeadlessRenderer::new(96, 64),
        modules,
        ViewportSize::new(96.0, 64.0, 1.0),
        config,
    )
    .unwrap()
}

/// Render until `handle` settles and return the number of frames it took.
fn settle(host: &mut RenderHost<HeadlessRenderer>, handle: &LoadHandle, now: &mut f64) -> usize {
    for frames in 0..600 {
        if handle.is_settled() {
            return frames;
        }
        host.frame(*now);
        *now += FRAME;
    }
    panic!("transition never settled");
}

#[test]
fn lightweight_mode_never_analyses_pixels() {
    let mut host = host(HostConfig::new().seed(99).lightweight(true));
    let mut now = 0.0;
    for i in 0..40 {
        let handle = host.navigate(if i % 2 == 0 { "/001" } else { "/002" });
        let kind = host.active_strategy().unwrap();
        assert!(kind.is_lightweight(), "picked {kind}");
        settle(&mut host, &handle, &mut now);
    }
}

#[test]
fn full_mode_eventually_uses_every_strategy() {
    let mut host = host(HostConfig::new().seed(4).duration_scale(0.2));
    let mut now = 0.0;
    let mut seen = Vec::new();
    for i in 0..80 {
        let handle = host.navigate(if i % 2 == 0 { "/001" } else { "/002" });
        let kind = host.active_strategy().unwrap();
        if !seen.contains(&kind) {
            seen.push(kind);
        }
        settle(&mut host, &handle, &mut now);
    }
    assert_eq!(seen.len(), StrategyKind::ALL.len(), "saw {seen:?}");
}

#[test]
fn fade_covers_the_swap() {
    let mut host = host(HostConfig::new().seed(1).strategy(StrategyKind::Fade));
    let mut now = 0.0;
    let handle = host.navigate("/001");

    let mut peak: f32 = 0.0;
    while !handle.is_settled() {
        host.frame(now);
        now += FRAME;
        if host.mounted().is_none() {
            if let Some(layer) = host.overlay().layers().first() {
                peak = peak.max(layer.opacity);
            }
        }
    }
    assert!(peak > 0.95, "overlay only reached {peak} before the swap");
    assert!(host.overlay().is_empty());
}

#[test]
fn fov_punch_widens_the_primary_draw() {
    let mut host = host(HostConfig::new().seed(1).strategy(StrategyKind::FovPunch));
    let mut now = 0.0;
    let handle = host.navigate("/002");
    settle(&mut host, &handle, &mut now);

    let base_fov = host.camera().fov;
    let widest = host
        .renderer()
        .calls()
        .iter()
        .filter_map(|(_, call)| match call {
            RenderCall::DrawScene { fov, pair, .. } if pair.is_primary() => Some(*fov),
            _ => None,
        })
        .fold(base_fov, f32::max);
    assert!(widest > base_fov + 5.0, "fov peaked at {widest}");

    // Back to normal once settled.
    host.frame(now);
    let last_fov = host
        .renderer()
        .calls()
        .iter()
        .rev()
        .find_map(|(_, call)| match call {
            RenderCall::DrawScene { fov, .. } => Some(*fov),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_fov, base_fov);
}

#[test]
fn snapshot_strategies_capture_the_old_scene_before_swapping() {
    for kind in [
        StrategyKind::ChannelDrift,
        StrategyKind::LumaDissolve,
        StrategyKind::DirectionalWipe,
        StrategyKind::DepthRipple,
    ] {
        let mut host = host(HostConfig::new().seed(8).strategy(kind));
        let mut now = 0.0;
        let first = host.navigate("/001");
        settle(&mut host, &first, &mut now);
        let captures_before = host.renderer().capture_requests();

        let handle = host.navigate("/002");
        let mut captured_while_old_mounted = false;
        while !handle.is_settled() {
            let old_mounted = host.mounted().map(SceneId::as_str) == Some("001");
            host.frame(now);
            now += FRAME;
            if old_mounted && host.renderer().capture_requests() > captures_before {
                captured_while_old_mounted = true;
            }
        }
        assert!(captured_while_old_mounted, "{kind}");
        assert_eq!(handle.status(), LoadStatus::Completed, "{kind}");
        assert!(host.overlay().is_empty(), "{kind}");
    }
}

#[test]
fn wipe_captures_both_sides() {
    let mut host = host(HostConfig::new().seed(3).strategy(StrategyKind::DirectionalWipe));
    let mut now = 0.0;
    let handle = host.navigate("/001");
    settle(&mut host, &handle, &mut now);
    assert_eq!(host.renderer().capture_requests(), 2);
}

#[test]
fn duration_scale_speeds_transitions_up() {
    let timed = |scale: f32| {
        let mut host = host(
            HostConfig::new()
                .seed(1)
                .strategy(StrategyKind::Fade)
                .duration_scale(scale),
        );
        let mut now = 0.0;
        let handle = host.navigate("/001");
        settle(&mut host, &handle, &mut now)
    };
    let normal = timed(1.0);
    let quick = timed(0.5);
    assert!(quick < normal, "{quick} frames vs {normal}");
}

#[test]
fn overlay_layers_reach_the_presented_frame() {
    let mut host = host(HostConfig::new().seed(1).strategy(StrategyKind::LumaDissolve));
    let mut now = 0.0;
    let handle = host.navigate("/001");
    settle(&mut host, &handle, &mut now);

    let presented_layers = host
        .renderer()
        .calls()
        .iter()
        .filter_map(|(_, call)| match call {
            RenderCall::Present { layers, .. } => Some(*layers),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert!(presented_layers.iter().any(|&n| n > 0));
    assert_eq!(presented_layers.last(), Some(&0));
}
