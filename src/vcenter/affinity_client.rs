//! Affinity-rule client (C5): a materialized view of installed VM-rules,
//! kept under one lock, plus the apply/delete operations issued against
//! the cluster.
//!
//! Known race (spec.md §4.5): `name_to_key` lags behind the cluster view
//! populated by `apply_cluster_update`. A delete that arrives before the
//! preceding apply's update has landed fails `NotFound`; a re-apply
//! before a delete has landed fails `DuplicateName`. Both are left
//! unresolved here — the reconciler's retry cycle absorbs them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{ClusterConfigUpdate, Rule, VcenterClient, VmId};
use crate::error::{Error, Result, RuleConflictKind};

#[derive(Default)]
struct Inner {
    by_key: HashMap<i32, Rule>,
    name_to_key: HashMap<String, i32>,
    by_name: HashMap<String, Rule>,
}

pub struct AffinityRuleClient {
    inner: Mutex<Inner>,
    client: Arc<dyn VcenterClient>,
}

impl AffinityRuleClient {
    pub fn new(client: Arc<dyn VcenterClient>) -> Self {
        Self { inner: Mutex::new(Inner::default()), client }
    }

    /// Returns a defensive copy of the current snapshot (spec.md §4.5).
    pub fn rules(&self) -> HashMap<String, Rule> {
        self.inner.lock().unwrap().by_name.clone()
    }

    /// Replaces the three indices whole, as `affinityClient.Run`'s update
    /// closure does. The stream is the sole source of truth; apply/delete
    /// calls never touch this state directly (spec.md §9).
    pub fn apply_cluster_update(&self, update: ClusterConfigUpdate) {
        let mut inner = self.inner.lock().unwrap();
        match update {
            ClusterConfigUpdate::Changed(raw_rules) => {
                let mut by_key = HashMap::new();
                let mut name_to_key = HashMap::new();
                let mut by_name = HashMap::new();
                for raw in raw_rules {
                    by_key.insert(raw.key, raw.rule.clone());
                    name_to_key.insert(raw.rule.name.clone(), raw.key);
                    by_name.insert(raw.rule.name.clone(), raw.rule);
                }
                inner.by_key = by_key;
                inner.name_to_key = name_to_key;
                inner.by_name = by_name;
            }
            ClusterConfigUpdate::Left => {
                inner.by_key.clear();
                inner.name_to_key.clear();
                inner.by_name.clear();
            }
        }
    }

    pub async fn apply_affinity(&self, name: &str, vms: &[String]) -> Result<()> {
        self.apply(name, true, vms).await
    }

    pub async fn apply_anti_affinity(&self, name: &str, vms: &[String]) -> Result<()> {
        self.apply(name, false, vms).await
    }

    async fn apply(&self, name: &str, affinity: bool, vms: &[String]) -> Result<()> {
        {
            let inner = self.inner.lock().unwrap();
            if inner.name_to_key.contains_key(name) {
                return Err(Error::RuleConflict(RuleConflictKind::DuplicateName));
            }
        }

        for vm in vms {
            if VmId::parse(vm).is_none() {
                return Err(Error::InvariantBroken(format!("malformed VM reference: {vm}")));
            }
        }

        tracing::debug!(name, affinity, ?vms, "vcenter: applying rule");
        self.client.reconfigure_add(name, affinity, vms).await
    }

    pub async fn delete_affinity(&self, name: &str) -> Result<()> {
        self.delete(name).await
    }

    pub async fn delete_anti_affinity(&self, name: &str) -> Result<()> {
        self.delete(name).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let key = {
            let inner = self.inner.lock().unwrap();
            *inner
                .name_to_key
                .get(name)
                .ok_or(Error::RuleConflict(RuleConflictKind::NotFound))?
        };

        tracing::debug!(name, key, "vcenter: deleting rule");
        self.client.reconfigure_remove(key).await
    }
}
