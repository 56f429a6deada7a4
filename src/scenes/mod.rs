//! Built-in demo scene modules.
//!
//! Each module exercises a different part of the mount contract:
//!
//! | id    | what it touches                                                  |
//! |-------|------------------------------------------------------------------|
//! | `001` | one node and one animation                                       |
//! | `002` | a node tree, fog, tone mapping, camera pose, a bloom compositor  |
//! | `003` | clear color, a bloom + film compositor chain, a second camera    |
//! | `004` | nothing; mounts without a teardown                               |

mod embers;
mod flock;
mod knot;

use crate::error::MountError;
use crate::module::{ModuleRegistry, SceneContext, Teardown};

/// A registry holding `001` through `004`.
pub fn builtin_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry
        .register("001", knot::mount)
        .register("002", flock::mount)
        .register("003", embers::mount)
        .register("004", blueprint);
    registry
}

/// Placeholder scene: leaves the backdrop alone.
fn blueprint(_ctx: &mut SceneContext<'_>) -> Result<Option<Teardown>, MountError> {
    Ok(None)
}
