use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use ktreg_catalog::{SignalSetDecl, Variant};
use tracing::{debug, warn};

use crate::tool::{SimTarget, Simulator, ToolRunner};

/// Fallback when nothing resolves: record every internal testbench signal.
pub const ADD_ALL_WAVES: &str = "add wave -internal *;";

/// First whitespace-separated token that looks like a hierarchy path and
/// whose last segment is exactly `name`. Transcript comment tokens are skipped.
pub fn parse_find_signals_output(stdout: &str, name: &str) -> Option<String> {
    stdout
        .split_whitespace()
        .filter(|tok| !tok.starts_with('#'))
        .filter(|tok| tok.contains('/'))
        .find(|tok| tok.rsplit('/').next() == Some(name))
        .map(str::to_string)
}

/// Maps short signal names to full hierarchy paths. Names that already
/// contain `/` are taken as-is; unresolvable names are dropped with a warning.
pub fn resolve_signals(
    tool: &dyn ToolRunner,
    sim: &Simulator,
    target: &SimTarget<'_>,
    names: &[String],
) -> Vec<String> {
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        if name.contains('/') {
            out.push(name.clone());
            continue;
        }
        let invocation = sim.find_signals(target, name);
        match tool.run(&invocation) {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                match parse_find_signals_output(&stdout, name) {
                    Some(path) => {
                        debug!(signal = %name, path = %path, "resolved signal");
                        out.push(path);
                    }
                    None => warn!(signal = %name, "signal not found in design hierarchy"),
                }
            }
            Err(err) => warn!(signal = %name, error = %format!("{err:#}"), "signal lookup failed"),
        }
    }
    out
}

pub fn add_wave_script(paths: &[String]) -> String {
    if paths.is_empty() {
        return ADD_ALL_WAVES.to_string();
    }
    paths
        .iter()
        .map(|p| format!("add wave {p};"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Read-through cache of resolved default signal sets, keyed by
/// (variant, set name). Two workers racing on a miss both resolve and the
/// later insert wins; both results are equivalent.
#[derive(Debug, Default)]
pub struct SignalCache {
    entries: RwLock<HashMap<(Variant, String), Arc<Vec<String>>>>,
}

impl SignalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, variant: Variant, set: &str) -> Option<Arc<Vec<String>>> {
        let guard = self.entries.read().unwrap_or_else(|e| e.into_inner());
        guard.get(&(variant, set.to_string())).cloned()
    }

    pub fn get_or_resolve(
        &self,
        variant: Variant,
        decl: &SignalSetDecl,
        resolve: impl FnOnce(&[String]) -> Vec<String>,
    ) -> Arc<Vec<String>> {
        if let Some(hit) = self.get(variant, &decl.name) {
            return hit;
        }
        let resolved = Arc::new(resolve(&decl.signals));
        let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
        guard.insert((variant, decl.name.clone()), Arc::clone(&resolved));
        resolved
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
