//! Administrator-supplied server URL overrides.

use std::collections::HashMap;

use approute_core::{normalize_server_url, Module};
use parking_lot::RwLock;

/// Server URLs that take precedence over every other resolution source.
///
/// A per-module override wins over the global one; either wins over the
/// cache, the remote router and the fallback resolver.
#[derive(Debug, Default)]
pub struct ServerOverrides {
    inner: RwLock<OverrideTable>,
}

#[derive(Debug, Default)]
struct OverrideTable {
    global: Option<String>,
    modules: HashMap<Module, String>,
}

impl ServerOverrides {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the URL of one module. `None` removes the override.
    pub fn set_module(&self, module: Module, url: Option<&str>) {
        let mut table = self.inner.write();
        match url {
            Some(url) => {
                table.modules.insert(module, normalize_server_url(url));
            }
            None => {
                table.modules.remove(&module);
            }
        }
    }

    /// Overrides the URL of every module. `None` removes the override.
    pub fn set_global(&self, url: Option<&str>) {
        self.inner.write().global = url.map(normalize_server_url);
    }

    /// The override in effect for `module`, if any.
    #[must_use]
    pub fn get(&self, module: Module) -> Option<String> {
        let table = self.inner.read();
        table
            .modules
            .get(&module)
            .or(table.global.as_ref())
            .cloned()
    }

    /// Drops every override.
    pub fn clear(&self) {
        let mut table = self.inner.write();
        table.global = None;
        table.modules.clear();
    }
}
