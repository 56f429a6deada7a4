//! Mount, teardown and shared-state behavior of the host, driven frame by
//! frame through the headless renderer.

use std::cell::RefCell;
use std::rc::Rc;

use vitrine::render::RenderCall;
use vitrine::*;

const FRAME: f64 = 1.0 / 60.0;

struct Driver {
    host: RenderHost<HeadlessRenderer>,
    now: f64,
}

impl Driver {
    fn new(modules: ModuleRegistry, config: HostConfig) -> Self {
        let host = RenderHost::new(
            HeadlessRenderer::new(800, 600),
            modules,
            ViewportSize::new(800.0, 600.0, 1.0),
            config,
        )
        .unwrap();
        Self { host, now: 0.0 }
    }

    fn frame(&mut self) {
        self.host.frame(self.now);
        self.now += FRAME;
    }

    fn frames(&mut self, count: usize) {
        for _ in 0..count {
            self.frame();
        }
    }

    /// Render until `handle` settles. Panics after ten seconds of frames.
    fn settle(&mut self, handle: &LoadHandle) -> LoadStatus {
        for _ in 0..600 {
            if handle.is_settled() {
                return handle.status();
            }
            self.frame();
        }
        panic!("navigation never settled");
    }

    fn go(&mut self, path: &str) -> LoadStatus {
        let handle = self.host.navigate(path);
        self.settle(&handle)
    }
}

type Journal = Rc<RefCell<Vec<String>>>;

/// A module that spawns one node, records its lifecycle and cleans up after itself.
fn recording(
    journal: &Journal,
    id: &'static str,
) -> impl Fn(&mut SceneContext<'_>) -> Result<Option<Teardown>, MountError> + 'static {
    let journal = journal.clone();
    move |ctx: &mut SceneContext<'_>| -> Result<Option<Teardown>, MountError> {
        journal.borrow_mut().push(format!("mount {id}"));
        let node = ctx.graph.spawn_visual(
            ctx.content_root,
            id,
            Transform::new(),
            Visual::new(Shape::Cube, Color::WHITE),
        )?;
        let journal = journal.clone();
        Ok(Some(Box::new(move |ctx: &mut SceneContext<'_>| {
            journal.borrow_mut().push(format!("teardown {id}"));
            let _ = ctx.graph.despawn(node);
        })))
    }
}

fn recording_registry(journal: &Journal) -> ModuleRegistry {
    let mut modules = ModuleRegistry::new();
    modules
        .register("001", recording(journal, "001"))
        .register("002", recording(journal, "002"));
    modules
}

fn fade() -> HostConfig {
    HostConfig::new().seed(11).strategy(StrategyKind::Fade)
}

#[test]
fn reloading_the_current_scene_does_nothing() {
    let journal = Journal::default();
    let mut driver = Driver::new(recording_registry(&journal), fade());
    assert_eq!(driver.go("/001"), LoadStatus::Completed);

    let again = driver.host.navigate("/001");
    assert_eq!(again.status(), LoadStatus::Unchanged);
    assert!(!driver.host.is_transitioning());
    driver.frames(30);
    assert_eq!(*journal.borrow(), ["mount 001"]);
}

#[test]
fn every_strategy_swaps_exactly_once_and_tears_down_first() {
    for kind in StrategyKind::ALL {
        let journal = Journal::default();
        let mut driver = Driver::new(
            recording_registry(&journal),
            HostConfig::new().seed(5).strategy(kind),
        );
        assert_eq!(driver.go("/001"), LoadStatus::Completed, "{kind}");
        assert_eq!(driver.go("/002"), LoadStatus::Completed, "{kind}");
        driver.frames(10);

        assert_eq!(
            *journal.borrow(),
            ["mount 001", "teardown 001", "mount 002"],
            "{kind}"
        );
        assert!(driver.host.overlay().is_empty(), "{kind} left overlay layers");
        assert_eq!(driver.host.mounted().map(SceneId::as_str), Some("002"));
    }
}

#[test]
fn one_primary_draw_per_frame() {
    let journal = Journal::default();
    let mut driver = Driver::new(recording_registry(&journal), fade());
    let handle = driver.host.navigate("/001");
    driver.settle(&handle);

    let renderer = driver.host.renderer();
    for frame in 0..renderer.frame() {
        assert_eq!(renderer.primary_draws(frame), 1, "frame {frame}");
    }
}

#[test]
fn failed_capture_still_swaps_and_clears_the_overlay() {
    let journal = Journal::default();
    let mut driver = Driver::new(
        recording_registry(&journal),
        HostConfig::new().seed(2).strategy(StrategyKind::LumaDissolve),
    );
    driver.host.renderer_mut().fail_captures(true);

    assert_eq!(driver.go("/001"), LoadStatus::Faulted);
    assert_eq!(driver.host.mounted().map(SceneId::as_str), Some("001"));
    assert!(driver.host.overlay().is_empty());
    assert!(!driver.host.is_transitioning());
}

#[test]
fn stalled_capture_times_out() {
    let journal = Journal::default();
    let mut driver = Driver::new(
        recording_registry(&journal),
        HostConfig::new()
            .seed(2)
            .strategy(StrategyKind::ChannelDrift)
            .snapshot_timeout(0.25),
    );
    driver.host.renderer_mut().stall_captures(true);

    let handle = driver.host.navigate("/001");
    driver.frames(5);
    assert_eq!(handle.status(), LoadStatus::Pending);

    assert_eq!(driver.settle(&handle), LoadStatus::Faulted);
    assert!(driver.host.time() < 1.0);
    assert_eq!(driver.host.mounted().map(SceneId::as_str), Some("001"));
    assert!(driver.host.overlay().is_empty());
}

#[test]
fn content_root_holds_only_the_mounted_scene() {
    let journal = Journal::default();
    let mut modules = recording_registry(&journal);
    // Forgets to clean up after itself.
    modules.register("003", |ctx: &mut SceneContext<'_>| {
        ctx.graph.spawn(ctx.content_root, "litter", Transform::new())?;
        Ok(None)
    });
    let mut driver = Driver::new(modules, fade());
    let root = driver.host.content_root();

    driver.go("/001");
    assert_eq!(driver.host.graph().child_count(root), 1);

    driver.go("/003");
    assert_eq!(driver.host.graph().child_count(root), 1);

    driver.go("/002");
    let children = driver.host.graph().children(root);
    assert_eq!(children.len(), 1);
    assert_eq!(driver.host.graph().name(children[0]).as_deref(), Some("002"));

    driver.go("/");
    assert_eq!(driver.host.graph().child_count(root), 0);
    assert_eq!(driver.host.mounted(), None);
}

#[test]
fn failing_mount_is_rolled_back() {
    let mut modules = ModuleRegistry::new();
    modules.register("005", |ctx: &mut SceneContext<'_>| {
        ctx.graph.spawn(ctx.content_root, "half-built", Transform::new())?;
        ctx.render_state.exposure = 3.0;
        ctx.camera.fov = 20.0;
        Err(MountError::Failed("asset missing".to_string()))
    });
    let mut driver = Driver::new(modules, fade());
    let state_before = *driver.host.render_state();
    let pose_before = driver.host.camera().pose();

    assert_eq!(driver.go("/005"), LoadStatus::Completed);
    assert_eq!(driver.host.mounted(), None);
    assert_eq!(driver.host.graph().child_count(driver.host.content_root()), 0);
    assert_eq!(*driver.host.render_state(), state_before);
    assert_eq!(driver.host.camera().pose(), pose_before);
}

#[test]
fn override_slot_returns_to_the_same_base_routine() {
    let mut driver = Driver::new(scenes::builtin_registry(), fade());
    let base = driver.host.override_slot().base_routine();
    assert!(!driver.host.override_slot().is_installed());

    driver.go("/002");
    assert!(driver.host.override_slot().is_installed());
    driver.go("/003");
    assert!(driver.host.override_slot().is_installed());
    driver.go("/");

    assert!(!driver.host.override_slot().is_installed());
    assert!(Rc::ptr_eq(&base, &driver.host.override_slot().base_routine()));
    assert_eq!(driver.host.renderer().live_targets(), 0);
}

#[test]
fn builtin_scenes_restore_global_state() {
    let mut driver = Driver::new(scenes::builtin_registry(), fade());
    let state = *driver.host.render_state();
    let pose = driver.host.camera().pose();

    for path in ["/001", "/002", "/003", "/004", "/"] {
        assert_eq!(driver.go(path), LoadStatus::Completed, "{path}");
    }
    driver.frames(5);
    assert_eq!(*driver.host.render_state(), state);
    assert_eq!(driver.host.camera().pose(), pose);
    assert!(driver.host.animations().is_empty());
}

#[test]
fn missing_scene_leaves_an_empty_viewport() {
    let mut driver = Driver::new(scenes::builtin_registry(), fade());
    driver.go("/001");

    assert_eq!(driver.go("/999"), LoadStatus::Completed);
    assert_eq!(driver.host.mounted(), None);
    assert_eq!(driver.host.graph().child_count(driver.host.content_root()), 0);
    assert!(driver.host.overlay().is_empty());
    assert!(driver.host.animations().is_empty());
}

#[test]
fn unknown_path_goes_home() {
    let mut driver = Driver::new(scenes::builtin_registry(), fade());
    driver.go("/001");
    assert_eq!(driver.go("/not-a-scene"), LoadStatus::Completed);
    assert_eq!(driver.host.mounted(), None);
}

#[test]
fn newer_navigation_supersedes_older() {
    let mut driver = Driver::new(scenes::builtin_registry(), fade());
    let first = driver.host.navigate("/002");
    driver.frames(3);
    let second = driver.host.navigate("/003");

    assert_eq!(driver.settle(&second), LoadStatus::Completed);
    assert_eq!(first.status(), LoadStatus::Superseded);
    assert_eq!(driver.host.mounted().map(SceneId::as_str), Some("003"));

    let root = driver.host.content_root();
    let names: Vec<_> = driver
        .host
        .graph()
        .children(root)
        .into_iter()
        .filter_map(|n| driver.host.graph().name(n))
        .collect();
    assert_eq!(names, ["embers"]);
    assert_eq!(driver.host.renderer().live_targets(), 3);
    assert!(driver.host.overlay().is_empty());
}

#[test]
fn navigating_back_mid_transition_is_not_a_noop() {
    let journal = Journal::default();
    let mut driver = Driver::new(recording_registry(&journal), fade());
    driver.go("/001");

    let away = driver.host.navigate("/002");
    driver.frames(2);
    let back = driver.host.navigate("/001");
    assert_eq!(back.status(), LoadStatus::Pending);

    driver.settle(&back);
    assert_eq!(away.status(), LoadStatus::Superseded);
    assert_eq!(driver.host.mounted().map(SceneId::as_str), Some("001"));
}

#[test]
fn resize_converges_geometrically_then_snaps() {
    let mut driver = Driver::new(ModuleRegistry::new(), fade());
    driver.frame();
    driver.host.resize(1600.0, 600.0, 1.0);

    for n in 1..=5 {
        driver.frame();
        let expected = 1600.0 - 800.0 * 0.75_f32.powi(n);
        let width = driver.host.viewport().width;
        assert!((width - expected).abs() < 1e-2, "frame {n}: {width} vs {expected}");
    }

    driver.frames(60);
    assert_eq!(driver.host.viewport().width, 1600.0);
    assert_eq!(driver.host.renderer().size(), (1600, 600));

    let applied = driver.host.renderer().applied_sizes().len();
    driver.frames(10);
    assert_eq!(driver.host.renderer().applied_sizes().len(), applied);
}

#[test]
fn resize_bursts_apply_at_most_once_per_frame() {
    let mut driver = Driver::new(ModuleRegistry::new(), fade());
    // 50 events over 200 ms, four or five per frame.
    for i in 0..50 {
        let width = if i % 2 == 0 { 1024.0 } else { 640.0 };
        driver.host.resize(width, 480.0 + i as f32, 1.0 + (i % 3) as f32 * 0.5);
        if i % 4 == 3 {
            driver.frame();
        }
    }
    driver.frames(120);

    let renderer = driver.host.renderer();
    for frame in 0..renderer.frame() {
        let sizes = renderer
            .calls_in_frame(frame)
            .filter(|call| matches!(call, RenderCall::SetSize { .. }))
            .count();
        assert!(sizes <= 1, "frame {frame} applied {sizes} sizes");
    }
    let last = driver.host.viewport();
    assert_eq!((last.width, last.height), (640.0, 529.0));
}

#[test]
fn ripples_fade_and_despawn() {
    let mut driver = Driver::new(ModuleRegistry::new(), fade());
    driver.frame();
    let nodes = driver.host.graph().len();
    let effects = driver.host.ambient_effects().len();

    driver.host.pointer_down(Vec2::new(400.0, 560.0));
    assert_eq!(driver.host.ambient_effects().len(), effects + 1);
    assert_eq!(driver.host.graph().len(), nodes + 3);

    assert!(driver.host.is_glitching());
    driver.frames(20);
    assert!(!driver.host.is_glitching());

    driver.frames(100);
    assert_eq!(driver.host.ambient_effects().len(), effects);
    assert_eq!(driver.host.graph().len(), nodes);
}

#[test]
fn ambient_orbits_run_under_every_scene() {
    let mut driver = Driver::new(scenes::builtin_registry(), fade());
    driver.go("/002");
    let planet = driver.host.backdrop().planets[0].orbit;
    let before = driver.host.graph().transform(planet).unwrap().rotation;
    driver.frames(30);
    let after = driver.host.graph().transform(planet).unwrap().rotation;
    assert!(before.angle_between(after) > 1e-4);
}
