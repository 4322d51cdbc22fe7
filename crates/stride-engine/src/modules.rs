//! Module table and loader hook.
//!
//! Module records are keyed by canonical identity and move monotonically
//! through unrequested -> pending -> source -> evaluating -> exports. The
//! loader hook is replaceable; the default performs a best-effort HTTP GET
//! on a background thread and delivers the text over a channel, so the
//! engine itself never assumes a transport.

use std::sync::mpsc::{channel, Receiver};

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::value::Value;

/// Result of asking the loader hook for a module.
pub enum ModuleFetch {
    /// Text available immediately.
    Ready(String),
    /// Text (or an error message) will arrive on this channel.
    Pending(Receiver<Result<String, String>>),
    /// The loader failed synchronously.
    Failed(String),
}

/// The loader hook signature: canonical module identity to fetched text.
pub type ModuleLoader = Box<dyn FnMut(&str) -> ModuleFetch>;

/// Lifecycle state of one module.
#[derive(Clone)]
pub enum ModuleRecord {
    /// Requested, fetch not yet complete.
    Pending,
    /// Fetched source text, not yet evaluated.
    Source(String),
    /// Evaluation in progress; holds the live (partial) exports object so
    /// cyclic imports observe it instead of re-evaluating.
    Evaluating(Value),
    /// Evaluated exports.
    Exports(Value),
}

/// The module cache.
pub struct ModuleTable {
    records: FxHashMap<SmolStr, ModuleRecord>,
}

impl ModuleTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn record(&self, key: &str) -> Option<ModuleRecord> {
        self.records.get(key).cloned()
    }

    pub fn mark_pending(&mut self, key: SmolStr) {
        self.records.entry(key).or_insert(ModuleRecord::Pending);
    }

    /// Records fetched source; never downgrades an evaluated module.
    pub fn set_source(&mut self, key: SmolStr, source: String) {
        match self.records.get(&key) {
            Some(ModuleRecord::Evaluating(_) | ModuleRecord::Exports(_)) => {}
            _ => {
                self.records.insert(key, ModuleRecord::Source(source));
            }
        }
    }

    pub fn set_evaluating(&mut self, key: SmolStr, exports: Value) {
        match self.records.get(&key) {
            Some(ModuleRecord::Exports(_)) => {}
            _ => {
                self.records.insert(key, ModuleRecord::Evaluating(exports));
            }
        }
    }

    pub fn set_exports(&mut self, key: SmolStr, exports: Value) {
        self.records.insert(key, ModuleRecord::Exports(exports));
    }

    /// Paths from `imports` (resolved against `base`) that have no fetched
    /// source yet.
    #[must_use]
    pub fn unfetched(&self, imports: &[SmolStr], base: &str) -> Vec<SmolStr> {
        imports
            .iter()
            .map(|path| resolve_url(path, base))
            .filter(|key| {
                matches!(self.records.get(key), None | Some(ModuleRecord::Pending))
            })
            .collect()
    }

    /// True when every path has source (or better) available.
    #[must_use]
    pub fn all_available(&self, keys: &[SmolStr]) -> bool {
        keys.iter().all(|key| {
            matches!(
                self.records.get(key),
                Some(
                    ModuleRecord::Source(_)
                        | ModuleRecord::Evaluating(_)
                        | ModuleRecord::Exports(_)
                )
            )
        })
    }
}

impl Default for ModuleTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonical module identity: relative paths resolve against the importing
/// unit's identity, everything else passes through unchanged.
#[must_use]
pub fn resolve_url(path: &str, base: &str) -> SmolStr {
    if !path.starts_with("./") && !path.starts_with("../") {
        return SmolStr::new(path);
    }
    // Keep a scheme prefix (e.g. "https://host") out of segment handling.
    let (prefix, base_path) = match base.find("://") {
        Some(at) => {
            let rest = &base[at + 3..];
            match rest.find('/') {
                Some(slash) => base.split_at(at + 3 + slash),
                None => (base, ""),
            }
        }
        None => ("", base),
    };
    let mut segments: Vec<&str> = base_path.split('/').collect();
    segments.pop(); // drop the unit's own file name
    for segment in path.split('/') {
        match segment {
            "." | "" => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    if prefix.is_empty() {
        SmolStr::new(joined)
    } else if joined.starts_with('/') {
        SmolStr::new(format!("{prefix}{joined}"))
    } else {
        SmolStr::new(format!("{prefix}/{joined}"))
    }
}

/// The default loader: a `ureq` GET on a background thread, delivered over
/// a channel.
pub(crate) fn default_loader(url: &str) -> ModuleFetch {
    let url = url.to_string();
    let (tx, rx) = channel();
    std::thread::spawn(move || {
        let result = ureq::get(&url)
            .call()
            .map_err(|err| err.to_string())
            .and_then(|mut response| {
                response
                    .body_mut()
                    .read_to_string()
                    .map_err(|err| err.to_string())
            });
        let _ = tx.send(result);
    });
    ModuleFetch::Pending(rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_against_the_importer() {
        assert_eq!(resolve_url("./b.js", "dir/a.js"), "dir/b.js");
        assert_eq!(resolve_url("../b.js", "dir/sub/a.js"), "dir/b.js");
        assert_eq!(resolve_url("lib/b.js", "dir/a.js"), "lib/b.js");
        assert_eq!(
            resolve_url("./b.js", "https://host/x/a.js"),
            "https://host/x/b.js"
        );
    }

    #[test]
    fn records_progress_monotonically() {
        let mut table = ModuleTable::new();
        let key = SmolStr::new("m.js");
        table.mark_pending(key.clone());
        assert!(matches!(table.record("m.js"), Some(ModuleRecord::Pending)));
        table.set_source(key.clone(), "export const x = 1;".to_string());
        assert!(matches!(table.record("m.js"), Some(ModuleRecord::Source(_))));
        table.set_exports(key.clone(), Value::Undefined);
        table.set_source(key, "ignored".to_string());
        assert!(matches!(table.record("m.js"), Some(ModuleRecord::Exports(_))));
    }
}
