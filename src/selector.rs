//! Label-set selector algebra (C1).
//!
//! A `Selector` is a predicate over a label set. `And`/`Or`/`Not` compose
//! selectors compiled from the orchestrator's label-selector DSL
//! (match-labels + match-expressions); this module is the only place that
//! DSL is interpreted.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};

pub type LabelSet = BTreeMap<String, String>;

pub trait Selector: Send + Sync {
    fn matches(&self, labels: &LabelSet) -> bool;
}

/// True iff every inner selector is true. Empty `And` is true.
#[derive(Default)]
pub struct And(pub Vec<Box<dyn Selector>>);

impl Selector for And {
    fn matches(&self, labels: &LabelSet) -> bool {
        self.0.iter().all(|s| s.matches(labels))
    }
}

/// True iff any inner selector is true. Empty `Or` is true.
#[derive(Default)]
pub struct Or(pub Vec<Box<dyn Selector>>);

impl Selector for Or {
    fn matches(&self, labels: &LabelSet) -> bool {
        if self.0.is_empty() {
            return true;
        }
        self.0.iter().any(|s| s.matches(labels))
    }
}

struct NotInner(Box<dyn Selector>);

impl Selector for NotInner {
    fn matches(&self, labels: &LabelSet) -> bool {
        !self.0.matches(labels)
    }
}

/// Negates `s`. Unused outside its own tests, like the equivalent `Not` in
/// the source this is grounded on.
pub fn not(s: Box<dyn Selector>) -> Box<dyn Selector> {
    Box::new(NotInner(s))
}

/// Leaf selector compiled from a Kubernetes `LabelSelector`
/// (match-labels ANDed with match-expressions).
pub struct Compiled {
    match_labels: BTreeMap<String, String>,
    match_expressions: Vec<LabelSelectorRequirement>,
}

impl Selector for Compiled {
    fn matches(&self, labels: &LabelSet) -> bool {
        for (k, v) in &self.match_labels {
            if labels.get(k) != Some(v) {
                return false;
            }
        }

        for req in &self.match_expressions {
            let values = req.values.clone().unwrap_or_default();
            let ok = match req.operator.as_str() {
                "In" => labels.get(&req.key).is_some_and(|v| values.contains(v)),
                "NotIn" => !labels.get(&req.key).is_some_and(|v| values.contains(v)),
                "Exists" => labels.contains_key(&req.key),
                "DoesNotExist" => !labels.contains_key(&req.key),
                _ => false,
            };
            if !ok {
                return false;
            }
        }

        true
    }
}

/// Compiles a `LabelSelector` into the selector algebra. A `None` selector
/// matches nothing (mirrors `metav1.LabelSelectorAsSelector` on a nil
/// selector, which the source treats as a warning-and-skip case upstream).
pub fn compile(selector: &LabelSelector) -> Box<dyn Selector> {
    Box::new(Compiled {
        match_labels: selector.match_labels.clone().unwrap_or_default(),
        match_expressions: selector.match_expressions.clone().unwrap_or_default(),
    })
}
