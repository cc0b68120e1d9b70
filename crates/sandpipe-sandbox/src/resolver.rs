//! Module resolution confined to a single directory.

use crate::result::{CapabilityDenied, raise};
use rhai::module_resolvers::FileModuleResolver;
use rhai::{Engine, EvalAltResult, Module, ModuleResolver, Position, Shared};
use std::path::{Component, Path, PathBuf};

/// Resolves `import` paths relative to one module directory and refuses
/// anything that could leave it.
pub struct ConfinedModuleResolver {
    root: PathBuf,
    inner: FileModuleResolver,
}

impl ConfinedModuleResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut inner = FileModuleResolver::new_with_path(&root);
        inner.enable_cache(true);
        Self { root, inner }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `path` stays inside the module directory.
    pub fn is_confined(path: &str) -> bool {
        is_confined_path(path)
    }
}

/// A non-empty relative path made only of normal components.
pub(crate) fn is_confined_path(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

impl ModuleResolver for ConfinedModuleResolver {
    fn resolve(
        &self,
        engine: &Engine,
        _source: Option<&str>,
        path: &str,
        pos: Position,
    ) -> Result<Shared<Module>, Box<EvalAltResult>> {
        if !Self::is_confined(path) {
            tracing::warn!(module = path, root = %self.root.display(), "import outside module directory refused");
            return Err(raise(CapabilityDenied(format!(
                "import '{path}' escapes the module directory"
            ))));
        }
        // Always resolve against the root, never against the importing file.
        self.inner.resolve(engine, None, path, pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_relative_paths_are_confined() {
        assert!(ConfinedModuleResolver::is_confined("util"));
        assert!(ConfinedModuleResolver::is_confined("lib/strings"));
        assert!(ConfinedModuleResolver::is_confined("./util"));
    }

    #[test]
    fn escaping_paths_are_refused() {
        assert!(!ConfinedModuleResolver::is_confined("../secret"));
        assert!(!ConfinedModuleResolver::is_confined("lib/../../secret"));
        assert!(!ConfinedModuleResolver::is_confined("/etc/passwd"));
        assert!(!ConfinedModuleResolver::is_confined(""));
    }

    #[test]
    fn resolve_loads_modules_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("util.rhai"), r#"fn shout(s) { s + "!" }"#).unwrap();
        let engine = Engine::new();
        let resolver = ConfinedModuleResolver::new(dir.path());

        let module: Shared<Module> = resolver
            .resolve(&engine, None, "util", Position::NONE)
            .unwrap();
        assert!(!module.is_empty());

        let err = resolver
            .resolve(&engine, None, "../util", Position::NONE)
            .unwrap_err();
        assert!(matches!(*err, EvalAltResult::ErrorRuntime(ref v, _) if v.is::<CapabilityDenied>()));
    }
}
