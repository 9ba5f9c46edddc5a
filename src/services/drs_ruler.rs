//! Reconciler (C7) — the core algorithm (spec.md §4.7).
//!
//! Derives a desired VM-rule set from tracked pods' affinity specs and
//! drives the virtualization cluster toward it every `reconcile_interval`.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use tokio::sync::watch;

use crate::algorithm::PodLister;
use crate::bridgecache;
use crate::constants::HOST_LABEL;
use crate::k8scache::dispatch::Subscriber;
use crate::metrics;
use crate::selector::And;
use crate::vcenter::{AffinityRuleClient, Rule};

pub struct DrsRuler {
    affinity_pods: Mutex<HashMap<String, Pod>>,
    anti_affinity_pods: Mutex<HashMap<String, Pod>>,
    pod_lister: Arc<dyn PodLister>,
    bridge: Arc<dyn bridgecache::Cache>,
    vcenter: Arc<AffinityRuleClient>,
    reconcile_interval: Duration,
}

impl DrsRuler {
    pub fn new(
        pod_lister: Arc<dyn PodLister>,
        bridge: Arc<dyn bridgecache::Cache>,
        vcenter: Arc<AffinityRuleClient>,
        reconcile_interval: Duration,
    ) -> Self {
        Self {
            affinity_pods: Mutex::new(HashMap::new()),
            anti_affinity_pods: Mutex::new(HashMap::new()),
            pod_lister,
            bridge,
            vcenter,
            reconcile_interval,
        }
    }

    /// Runs the periodic reconcile loop until `stop` is signalled.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) {
        tracing::info!("starting DRSRuler service");
        let mut ticker = tokio::time::interval(self.reconcile_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sync().await;
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        return;
                    }
                }
            }
        }
    }

    async fn sync(&self) {
        let timer = metrics::start_reconcile_pass();

        let actual = self.vcenter.rules();
        let desired = self.desired_rules();

        tracing::debug!(?actual, ?desired, "DRSRuler: reconcile pass");

        for (name, rule) in actual.iter() {
            if !desired.contains_key(name) {
                tracing::info!(name, "DRSRuler: deleting rule no longer desired");
                let result = if rule.affinity {
                    self.vcenter.delete_affinity(name).await
                } else {
                    self.vcenter.delete_anti_affinity(name).await
                };
                metrics::record_rule_op("delete", result.is_ok());
                if let Err(err) = result {
                    tracing::warn!(name, error = %err, "DRSRuler: delete failed, retrying next pass");
                }
            }
        }

        for (name, rule) in desired.iter() {
            if !actual.contains_key(name) {
                tracing::info!(name, ?rule, "DRSRuler: applying missing rule");
                let vms: Vec<String> = rule.vms.iter().cloned().collect();
                let result = if rule.affinity {
                    self.vcenter.apply_affinity(name, &vms).await
                } else {
                    self.vcenter.apply_anti_affinity(name, &vms).await
                };
                metrics::record_rule_op("apply", result.is_ok());
                if let Err(err) = result {
                    tracing::warn!(name, error = %err, "DRSRuler: apply failed, retrying next pass");
                }
            }
        }

        for (name, desired_rule) in desired.iter() {
            if let Some(actual_rule) = actual.get(name) {
                if desired_rule.vms != actual_rule.vms {
                    tracing::info!(name, "DRSRuler: rule drifted, re-applying");
                    // Open question (a), spec.md §9: the re-apply is keyed
                    // off the *desired* rule's kind, not the actual rule's.
                    let delete_result = if actual_rule.affinity {
                        self.vcenter.delete_affinity(name).await
                    } else {
                        self.vcenter.delete_anti_affinity(name).await
                    };
                    metrics::record_rule_op("delete", delete_result.is_ok());

                    let vms: Vec<String> = desired_rule.vms.iter().cloned().collect();
                    let apply_result = if desired_rule.affinity {
                        self.vcenter.apply_affinity(name, &vms).await
                    } else {
                        self.vcenter.apply_anti_affinity(name, &vms).await
                    };
                    metrics::record_rule_op("apply", apply_result.is_ok());
                }
            }
        }

        timer.success();
    }

    fn desired_rules(&self) -> HashMap<String, Rule> {
        let mut rules = self.build_rules(&self.affinity_pods.lock().unwrap(), true);
        rules.extend(self.build_rules(&self.anti_affinity_pods.lock().unwrap(), false));
        rules
    }

    fn build_rules(&self, pods: &HashMap<String, Pod>, affinity: bool) -> HashMap<String, Rule> {
        let mut rules = HashMap::new();

        for pod in pods.values() {
            let terms = if affinity {
                pod.spec
                    .as_ref()
                    .and_then(|s| s.affinity.as_ref())
                    .and_then(|a| a.pod_affinity.as_ref())
                    .and_then(|pa| pa.required_during_scheduling_ignored_during_execution.as_ref())
            } else {
                pod.spec
                    .as_ref()
                    .and_then(|s| s.affinity.as_ref())
                    .and_then(|a| a.pod_anti_affinity.as_ref())
                    .and_then(|pa| pa.required_during_scheduling_ignored_during_execution.as_ref())
            };
            let Some(terms) = terms else { continue };

            let host_terms = crate::algorithm::filters::host_label_terms(terms);
            let selectors = crate::algorithm::filters::compile_terms(&host_terms);
            let selector = And(selectors);

            let matched = self.pod_lister.list_pods(&selector);
            if matched.is_empty() {
                continue;
            }

            let mut vms: BTreeSet<String> = matched
                .iter()
                .filter_map(|p| p.spec.as_ref().and_then(|s| s.node_name.clone()))
                .filter(|n| !n.is_empty())
                .filter_map(|n| self.bridge.get_vmid_from_node(&n))
                .collect();

            if let Some(node) = pod.spec.as_ref().and_then(|s| s.node_name.clone()) {
                if let Some(vmid) = self.bridge.get_vmid_from_node(&node) {
                    vms.insert(vmid);
                }
            }

            // Open question (b), spec.md §9: drop unresolved VM ids rather
            // than emit them and let the cluster reject them.
            if vms.is_empty() {
                continue;
            }

            let uid = pod.metadata.uid.clone().unwrap_or_default();
            let name = rule_name(&uid, affinity);
            rules.insert(name.clone(), Rule { name, affinity, vms });
        }

        rules
    }
}

fn rule_name(uid: &str, affinity: bool) -> String {
    if affinity {
        format!("affi-{uid}")
    } else {
        format!("anti-{uid}")
    }
}

impl Subscriber<Pod> for DrsRuler {
    fn on_add(&self, pod: &Pod) {
        let node_name = pod.spec.as_ref().and_then(|s| s.node_name.clone()).unwrap_or_default();
        if node_name.is_empty() {
            return;
        }
        let Some(affinity) = pod.spec.as_ref().and_then(|s| s.affinity.as_ref()) else { return };
        let uid = pod.metadata.uid.clone().unwrap_or_default();

        if affinity.pod_affinity.is_some() {
            let mut pods = self.affinity_pods.lock().unwrap();
            pods.insert(uid.clone(), pod.clone());
            metrics::set_cache_size("affinity_pods", pods.len());
        }
        if affinity.pod_anti_affinity.is_some() {
            let mut pods = self.anti_affinity_pods.lock().unwrap();
            pods.insert(uid, pod.clone());
            metrics::set_cache_size("anti_affinity_pods", pods.len());
        }
    }

    fn on_update(&self, old: &Pod, new: &Pod) {
        let old_node = old.spec.as_ref().and_then(|s| s.node_name.clone()).unwrap_or_default();
        let new_node = new.spec.as_ref().and_then(|s| s.node_name.clone()).unwrap_or_default();

        // Deliberate: a pod becomes tracked only the first time an
        // assignment appears (spec.md §4.7, §9). Terms added after
        // assignment without an assignment-change event are not retracked.
        if old_node.is_empty() && !new_node.is_empty() {
            self.on_add(new);
        }
    }

    fn on_delete(&self, pod: &Pod) {
        let node_name = pod.spec.as_ref().and_then(|s| s.node_name.clone()).unwrap_or_default();
        if node_name.is_empty() {
            return;
        }
        let Some(affinity) = pod.spec.as_ref().and_then(|s| s.affinity.as_ref()) else { return };
        let uid = pod.metadata.uid.clone().unwrap_or_default();

        if affinity.pod_affinity.is_some() {
            let mut pods = self.affinity_pods.lock().unwrap();
            pods.remove(&uid);
            metrics::set_cache_size("affinity_pods", pods.len());
        }
        if affinity.pod_anti_affinity.is_some() {
            let mut pods = self.anti_affinity_pods.lock().unwrap();
            pods.remove(&uid);
            metrics::set_cache_size("anti_affinity_pods", pods.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::selector::Selector;
    use crate::vcenter::{ClusterConfigUpdate, RawRule, VcenterClient};
    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::{Affinity, PodAffinity, PodAffinityTerm, PodAntiAffinity, PodSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
    use std::collections::BTreeMap;
    use std::sync::Mutex as StdMutex;

    struct FakeBridge(BTreeMap<String, String>);
    impl bridgecache::Cache for FakeBridge {
        fn get_vmid_from_node(&self, name: &str) -> Option<String> {
            self.0.get(name).cloned()
        }
    }

    struct FakePodLister(Vec<Pod>);
    impl PodLister for FakePodLister {
        fn list_pods(&self, selector: &dyn Selector) -> Vec<Pod> {
            self.0
                .iter()
                .filter(|p| selector.matches(&p.metadata.labels.clone().unwrap_or_default()))
                .cloned()
                .collect()
        }
    }

    #[derive(Default)]
    struct FakeVcenterClient {
        added: StdMutex<Vec<(String, bool, Vec<String>)>>,
        removed: StdMutex<Vec<i32>>,
    }

    #[async_trait]
    impl VcenterClient for FakeVcenterClient {
        async fn reconfigure_add(&self, name: &str, affinity: bool, vms: &[String]) -> Result<()> {
            self.added.lock().unwrap().push((name.to_string(), affinity, vms.to_vec()));
            Ok(())
        }
        async fn reconfigure_remove(&self, key: i32) -> Result<()> {
            self.removed.lock().unwrap().push(key);
            Ok(())
        }
    }

    fn pod(uid: &str, node: &str, labels: &[(&str, &str)], affinity: Option<Affinity>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                uid: Some(uid.to_string()),
                labels: Some(labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some(node.to_string()),
                affinity,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn required_affinity(key: &str, value: &str) -> Affinity {
        Affinity {
            pod_affinity: Some(PodAffinity {
                required_during_scheduling_ignored_during_execution: Some(vec![PodAffinityTerm {
                    label_selector: Some(LabelSelector {
                        match_labels: Some(BTreeMap::from([(key.to_string(), value.to_string())])),
                        match_expressions: None,
                    }),
                    topology_key: HOST_LABEL.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn required_anti_affinity(key: &str, value: &str) -> Affinity {
        Affinity {
            pod_anti_affinity: Some(PodAntiAffinity {
                required_during_scheduling_ignored_during_execution: Some(vec![PodAffinityTerm {
                    label_selector: Some(LabelSelector {
                        match_labels: Some(BTreeMap::from([(key.to_string(), value.to_string())])),
                        match_expressions: None,
                    }),
                    topology_key: HOST_LABEL.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    // S4 — desired rules from a mixed spec.
    #[tokio::test]
    async fn desired_rules_from_mixed_spec() {
        let anchor = pod("u0", "n0", &[("type", "anchor")], None);
        let p1 = pod("u1", "n1", &[], Some(required_affinity("type", "anchor")));
        let p2 = pod("u2", "n2", &[], Some(required_anti_affinity("type", "anchor")));

        let lister = Arc::new(FakePodLister(vec![anchor.clone(), p1.clone(), p2.clone()]));
        let bridge = Arc::new(FakeBridge(BTreeMap::from([
            ("n0".to_string(), "VirtualMachine:vm0".to_string()),
            ("n1".to_string(), "VirtualMachine:vm1".to_string()),
            ("n2".to_string(), "VirtualMachine:vm2".to_string()),
        ])));
        let vcenter = Arc::new(AffinityRuleClient::new(Arc::new(FakeVcenterClient::default())));

        let ruler = DrsRuler::new(lister, bridge, vcenter, Duration::from_secs(15));
        ruler.on_add(&p1);
        ruler.on_add(&p2);

        let desired = ruler.desired_rules();

        assert_eq!(
            desired.get("affi-u1").unwrap().vms,
            BTreeSet::from(["VirtualMachine:vm0".to_string(), "VirtualMachine:vm1".to_string()])
        );
        assert_eq!(
            desired.get("anti-u2").unwrap().vms,
            BTreeSet::from(["VirtualMachine:vm0".to_string(), "VirtualMachine:vm2".to_string()])
        );
    }

    // S5 — convergence under drift: exactly one delete and one apply issued.
    #[tokio::test]
    async fn convergence_under_drift_issues_one_delete_and_one_apply() {
        let p1 = pod("u1", "n1", &[], Some(required_affinity("type", "anchor")));

        // Desired view now includes a third matching pod on n5 (drift: the
        // installed rule below only knows about n0/n1).
        let lister = Arc::new(FakePodLister(vec![
            pod("u0", "n0", &[("type", "anchor")], None),
            pod("u0b", "n5", &[("type", "anchor")], None),
            p1.clone(),
        ]));
        let bridge = Arc::new(FakeBridge(BTreeMap::from([
            ("n0".to_string(), "VirtualMachine:vm0".to_string()),
            ("n1".to_string(), "VirtualMachine:vm1".to_string()),
            ("n5".to_string(), "VirtualMachine:vm5".to_string()),
        ])));
        let fake_client = Arc::new(FakeVcenterClient::default());
        let vcenter = Arc::new(AffinityRuleClient::new(fake_client.clone()));
        vcenter.apply_cluster_update(ClusterConfigUpdate::Changed(vec![RawRule {
            key: 1,
            rule: Rule {
                name: "affi-u1".to_string(),
                affinity: true,
                vms: BTreeSet::from(["VirtualMachine:vm0".to_string(), "VirtualMachine:vm1".to_string()]),
            },
        }]));

        let ruler = DrsRuler::new(lister, bridge, vcenter, Duration::from_secs(15));
        ruler.on_add(&p1);

        ruler.sync().await;

        assert_eq!(fake_client.removed.lock().unwrap().len(), 1);
        assert_eq!(fake_client.added.lock().unwrap().len(), 1);
    }

    // S6 — rule deletion on pod removal.
    #[tokio::test]
    async fn rule_deleted_after_pod_removal() {
        let anchor = pod("u0", "n0", &[("type", "anchor")], None);
        let p1 = pod("u1", "n1", &[], Some(required_affinity("type", "anchor")));

        let lister = Arc::new(FakePodLister(vec![anchor]));
        let bridge = Arc::new(FakeBridge(BTreeMap::from([
            ("n0".to_string(), "VirtualMachine:vm0".to_string()),
            ("n1".to_string(), "VirtualMachine:vm1".to_string()),
        ])));
        let fake_client = Arc::new(FakeVcenterClient::default());
        let vcenter = Arc::new(AffinityRuleClient::new(fake_client.clone()));
        vcenter.apply_cluster_update(ClusterConfigUpdate::Changed(vec![RawRule {
            key: 1,
            rule: Rule {
                name: "affi-u1".to_string(),
                affinity: true,
                vms: BTreeSet::from(["VirtualMachine:vm0".to_string(), "VirtualMachine:vm1".to_string()]),
            },
        }]));

        let ruler = DrsRuler::new(lister, bridge, vcenter, Duration::from_secs(15));
        ruler.on_add(&p1);
        ruler.on_delete(&p1);

        ruler.sync().await;

        assert_eq!(fake_client.removed.lock().unwrap(), vec![1]);
    }

    // Testable property 5: reconciler fixed point. With a quiescent pod
    // stream, once the cluster-config stream has caught up with a prior
    // apply, a second sync issues no further mutation and actual == desired.
    #[tokio::test]
    async fn reconciler_reaches_fixed_point_within_two_ticks() {
        let anchor = pod("u0", "n0", &[("type", "anchor")], None);
        let p1 = pod("u1", "n1", &[], Some(required_affinity("type", "anchor")));

        let lister = Arc::new(FakePodLister(vec![anchor, p1.clone()]));
        let bridge = Arc::new(FakeBridge(BTreeMap::from([
            ("n0".to_string(), "VirtualMachine:vm0".to_string()),
            ("n1".to_string(), "VirtualMachine:vm1".to_string()),
        ])));
        let fake_client = Arc::new(FakeVcenterClient::default());
        let vcenter = Arc::new(AffinityRuleClient::new(fake_client.clone()));

        let ruler = DrsRuler::new(lister, bridge.clone(), vcenter.clone(), Duration::from_secs(15));
        ruler.on_add(&p1);

        // Tick 1: cluster starts with no installed rules, so the desired
        // rule is applied.
        ruler.sync().await;
        assert_eq!(fake_client.added.lock().unwrap().len(), 1);

        // The cluster-config stream catches up with what was just applied.
        let desired = ruler.desired_rules();
        vcenter.apply_cluster_update(ClusterConfigUpdate::Changed(
            desired
                .values()
                .enumerate()
                .map(|(i, rule)| RawRule { key: i as i32, rule: rule.clone() })
                .collect(),
        ));

        // Tick 2: actual now matches desired, so no further apply/delete is
        // issued — the fixed point.
        ruler.sync().await;
        assert_eq!(fake_client.added.lock().unwrap().len(), 1);
        assert!(fake_client.removed.lock().unwrap().is_empty());
        assert_eq!(vcenter.rules(), ruler.desired_rules());
    }

    #[test]
    fn rule_name_is_deterministic_in_uid_and_kind() {
        assert_eq!(rule_name("abc-123", true), "affi-abc-123");
        assert_eq!(rule_name("abc-123", false), "anti-abc-123");
        assert_eq!(rule_name("abc-123", true), rule_name("abc-123", true));
    }

    #[test]
    fn update_only_tracks_on_assignment_transition() {
        let lister = Arc::new(FakePodLister(vec![]));
        let bridge = Arc::new(FakeBridge(BTreeMap::new()));
        let vcenter = Arc::new(AffinityRuleClient::new(Arc::new(FakeVcenterClient::default())));
        let ruler = DrsRuler::new(lister, bridge, vcenter, Duration::from_secs(15));

        let pending = pod("u1", "", &[], Some(required_affinity("type", "anchor")));
        let assigned = pod("u1", "n1", &[], Some(required_affinity("type", "anchor")));

        ruler.on_update(&pending, &assigned);
        assert!(ruler.affinity_pods.lock().unwrap().contains_key("u1"));

        // A second update between two already-assigned states must not
        // retrack (mirrors the source's OnUpdate only calling OnAdd on a
        // "" -> non-empty transition).
        ruler.affinity_pods.lock().unwrap().remove("u1");
        ruler.on_update(&assigned, &assigned);
        assert!(!ruler.affinity_pods.lock().unwrap().contains_key("u1"));
    }
}
