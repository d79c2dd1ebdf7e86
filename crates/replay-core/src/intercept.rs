//! Interceptor registry (§4.2): priority-ordered pattern matchers that
//! short-circuit forwarding with a canned response.

use replay_protocol::{InterceptId, InterceptSpec, RequestPayload};
use std::collections::HashMap;
use std::sync::Mutex;

struct Entry {
    spec: InterceptSpec,
    match_count: u32,
    insertion_order: u64,
}

#[derive(Debug, Clone)]
pub struct InterceptMatch {
    pub id: InterceptId,
    pub spec: InterceptSpec,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InterceptStats {
    pub match_count: u32,
    pub active: bool,
}

#[derive(Default)]
pub struct InterceptRegistry {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<InterceptId, Entry>,
    next_insertion_order: u64,
}

impl InterceptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, spec: InterceptSpec) -> InterceptId {
        let id = InterceptId::new();
        let mut inner = self.inner.lock().unwrap();
        let order = inner.next_insertion_order;
        inner.next_insertion_order += 1;
        inner.entries.insert(
            id,
            Entry {
                spec,
                match_count: 0,
                insertion_order: order,
            },
        );
        id
    }

    pub fn remove(&self, id: InterceptId) -> bool {
        self.inner.lock().unwrap().entries.remove(&id).is_some()
    }

    /// Clears intercepts, optionally scoped to `service`. Returns the
    /// number removed.
    pub fn clear(&self, service: Option<&str>) -> usize {
        let mut inner = self.inner.lock().unwrap();
        match service {
            None => {
                let n = inner.entries.len();
                inner.entries.clear();
                n
            }
            Some(svc) => {
                let before = inner.entries.len();
                inner.entries.retain(|_, e| e.spec.match_spec.service != svc);
                before - inner.entries.len()
            }
        }
    }

    fn is_active(entry: &Entry) -> bool {
        match entry.spec.times {
            Some(limit) => entry.match_count < limit,
            None => true,
        }
    }

    /// Scans all entries whose `match.service` matches `request.service`,
    /// filters by the well-known string fields, and among active candidates
    /// returns the one with highest priority (ties broken by insertion
    /// order). Increments `match_count` on a hit (§4.2).
    pub fn match_request(&self, request: &RequestPayload) -> Option<InterceptMatch> {
        let mut inner = self.inner.lock().unwrap();

        let best_id = inner
            .entries
            .iter()
            .filter(|(_, e)| Self::is_active(e) && Self::candidate_matches(&e.spec, request))
            .max_by(|(_, a), (_, b)| {
                a.spec
                    .priority
                    .cmp(&b.spec.priority)
                    .then(b.insertion_order.cmp(&a.insertion_order))
            })
            .map(|(id, _)| *id)?;

        let entry = inner.entries.get_mut(&best_id).expect("entry just found");
        entry.match_count += 1;
        Some(InterceptMatch {
            id: best_id,
            spec: entry.spec.clone(),
        })
    }

    fn candidate_matches(spec: &InterceptSpec, request: &RequestPayload) -> bool {
        let m = &spec.match_spec;
        if m.service != request.service {
            return false;
        }
        if let Some(fname) = &m.function_name {
            if request.field_str("functionName") != Some(fname.as_str()) {
                return false;
            }
        }
        if let Some(url_match) = &m.url_match {
            match request.field_str("url") {
                Some(url) if url_match.matches(url) => {}
                _ => return false,
            }
        }
        if let Some(method) = &m.method {
            if request.field_str("method") != Some(method.as_str()) {
                return false;
            }
        }
        true
    }

    pub fn stats(&self, id: InterceptId) -> Option<InterceptStats> {
        let inner = self.inner.lock().unwrap();
        inner.entries.get(&id).map(|e| InterceptStats {
            match_count: e.match_count,
            active: Self::is_active(e),
        })
    }

    pub fn list(&self) -> Vec<(InterceptId, InterceptSpec)> {
        let inner = self.inner.lock().unwrap();
        let mut entries: Vec<_> = inner
            .entries
            .iter()
            .map(|(id, e)| (*id, e.spec.clone(), e.insertion_order))
            .collect();
        entries.sort_by_key(|(_, _, order)| *order);
        entries.into_iter().map(|(id, spec, _)| (id, spec)).collect()
    }
}
