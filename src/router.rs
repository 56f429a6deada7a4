//! Path routing: `/` is home, `/NNN` is a scene.

use crate::module::SceneId;

/// A resolved path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    /// The scene to show, or `None` for home.
    pub scene: Option<SceneId>,
    /// The path matched no route and was sent home.
    pub redirected: bool,
}

impl Route {
    pub fn home() -> Self {
        Self {
            scene: None,
            redirected: false,
        }
    }

    /// Canonical path for this route.
    pub fn path(&self) -> String {
        match &self.scene {
            Some(id) => format!("/{id}"),
            None => "/".to_string(),
        }
    }
}

/// Resolve a path. Anything that is not `/` or `/` plus exactly three ASCII
/// digits redirects home.
pub fn resolve(path: &str) -> Route {
    if path == "/" {
        return Route::home();
    }
    match path.strip_prefix('/') {
        Some(id) if id.len() == 3 && id.bytes().all(|b| b.is_ascii_digit()) => Route {
            scene: Some(SceneId::from(id)),
            redirected: false,
        },
        _ => {
            log::debug!("no route for `{path}`, redirecting home");
            Route {
                scene: None,
                redirected: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_and_scene_paths() {
        assert_eq!(resolve("/"), Route::home());
        assert_eq!(resolve("/002").scene, Some(SceneId::from("002")));
        assert_eq!(resolve("/999").path(), "/999");
    }

    #[test]
    fn everything_else_redirects() {
        for path in ["", "/01", "/0001", "/abc", "/002/", "002", "/00a"] {
            let route = resolve(path);
            assert!(route.redirected, "{path} should redirect");
            assert_eq!(route.scene, None);
            assert_eq!(route.path(), "/");
        }
    }
}
