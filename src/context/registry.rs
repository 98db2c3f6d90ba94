//! Component registry and render-skip decision.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::component::Signature;
use crate::paths::PathMap;

use super::action::Provenance;
use super::instance::Instance;

/// Last render output of an instance and the props it was produced with.
pub(crate) struct CachedRender<R> {
    pub(crate) props: Value,
    pub(crate) value: R,
}

struct Entry<R> {
    paths: PathMap,
    edges: HashSet<Signature>,
    instance: Option<Instance<R>>,
    render: Option<CachedRender<R>>,
}

pub(crate) struct Registry<R> {
    entries: HashMap<Signature, Entry<R>>,
    last_owner: Option<Signature>,
}

impl<R: Clone> Registry<R> {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
            last_owner: None,
        }
    }

    /// Ensure an entry exists and link it to every overlapping component.
    pub(crate) fn register(&mut self, signature: &Signature, paths: &PathMap) {
        if self.entries.contains_key(signature) {
            return;
        }

        let dependents: Vec<Signature> = self
            .entries
            .iter()
            .filter(|(_, entry)| paths_overlap(&entry.paths, paths))
            .map(|(other, _)| other.clone())
            .collect();

        for other in &dependents {
            if let Some(entry) = self.entries.get_mut(other) {
                entry.edges.insert(signature.clone());
            }
        }

        self.entries.insert(
            signature.clone(),
            Entry {
                paths: paths.clone(),
                edges: dependents.into_iter().collect(),
                instance: None,
                render: None,
            },
        );
    }

    pub(crate) fn contains(&self, signature: &Signature) -> bool {
        self.entries.contains_key(signature)
    }

    pub(crate) fn should_render(&self, signature: &Signature) -> bool {
        let Some(owner) = &self.last_owner else {
            return true;
        };
        let Some(entry) = self.entries.get(signature) else {
            return true;
        };
        entry.render.is_none() || signature == owner || entry.edges.contains(owner)
    }

    /// Remember who caused the latest commit and drop the cached renders it
    /// made stale: the owner and everything linked to it, or every render
    /// when the commit has no owning component.
    ///
    /// Stale renders stay dropped until the next render of that component,
    /// so several commits applied in one batch all count.
    pub(crate) fn record_action(&mut self, provenance: &Provenance) {
        match provenance.source.signature() {
            Some(owner) => {
                let stale: Vec<Signature> = self
                    .entries
                    .get(owner)
                    .map(|entry| entry.edges.iter().cloned().collect())
                    .unwrap_or_default();
                for signature in stale.iter().chain(std::iter::once(owner)) {
                    if let Some(entry) = self.entries.get_mut(signature) {
                        entry.render = None;
                    }
                }
                self.last_owner = Some(owner.clone());
            }
            None => {
                for entry in self.entries.values_mut() {
                    entry.render = None;
                }
                self.last_owner = None;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn last_owner(&self) -> Option<&Signature> {
        self.last_owner.as_ref()
    }

    pub(crate) fn cache_render(&mut self, signature: &Signature, props: Value, value: R) {
        if let Some(entry) = self.entries.get_mut(signature) {
            entry.render = Some(CachedRender { props, value });
        }
    }

    pub(crate) fn cached_render(&self, signature: &Signature) -> Option<&CachedRender<R>> {
        self.entries.get(signature)?.render.as_ref()
    }

    pub(crate) fn cache_instance(&mut self, signature: &Signature, instance: Instance<R>) {
        if let Some(entry) = self.entries.get_mut(signature) {
            entry.instance = Some(instance);
        }
    }

    pub(crate) fn cached_instance(&self, signature: &Signature) -> Option<Instance<R>> {
        self.entries.get(signature)?.instance.clone()
    }

    /// Signatures linked to `signature` by a dependency edge.
    #[cfg(test)]
    pub(crate) fn dependents(&self, signature: &Signature) -> Vec<Signature> {
        let mut dependents: Vec<Signature> = self
            .entries
            .get(signature)
            .map(|entry| entry.edges.iter().cloned().collect())
            .unwrap_or_default();
        dependents.sort();
        dependents
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.last_owner = None;
    }
}

fn paths_overlap(a: &PathMap, b: &PathMap) -> bool {
    a.values().any(|left| b.values().any(|right| left.overlaps(right)))
}
