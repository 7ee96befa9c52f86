//! Dynamic metadata maps. `sharedData` and session
//! `metadata` are arbitrary JSON-shaped maps; we keep them as
//! `serde_json::Map` (a structured, serializable tree) rather than
//! `Box<dyn Any>` or similar, and validate at tool boundaries instead
//! of at every internal read site.

use serde_json::{Map, Value};

pub type SharedData = Map<String, Value>;

/// Shallow-merges `patch` into `target`, the semantics `updateMetadata`
/// needs.
pub fn shallow_merge(target: &mut SharedData, patch: &SharedData) {
    for (k, v) in patch {
        target.insert(k.clone(), v.clone());
    }
}
