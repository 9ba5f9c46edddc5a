//! The virtualization-side half of the hostname↔VM-id bridge (C4):
//! `hostnameToVMID`, `vmidToHostname`, `vmidToHostRef`, and the
//! lazily-populated `hostRef → hostName` cache.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{VmProperty, VmPropertyUpdate};

#[derive(Default)]
struct Inner {
    hostname_to_vmid: HashMap<String, String>,
    vmid_to_hostname: HashMap<String, String>,
    vmid_to_host_ref: HashMap<String, String>,
    host_ref_to_host_name: HashMap<String, String>,
}

/// Read-only view the bridge and the reconciler consult to resolve a VM
/// id from a hostname, or a host name from a VM id.
pub struct Querier {
    inner: Mutex<Inner>,
}

impl Default for Querier {
    fn default() -> Self {
        Self::new()
    }
}

impl Querier {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }

    pub fn vmid_from_hostname(&self, hostname: &str) -> Option<String> {
        self.inner.lock().unwrap().hostname_to_vmid.get(hostname).cloned()
    }

    pub fn hostname_from_vmid(&self, vmid: &str) -> Option<String> {
        self.inner.lock().unwrap().vmid_to_hostname.get(vmid).cloned()
    }

    /// Resolves a VM's current physical-host name, populating the
    /// `hostRef → hostName` cache lazily via `resolve_host_name` when the
    /// reference has not been seen before.
    pub fn host_from_vmid<F>(&self, vmid: &str, resolve_host_name: F) -> Option<String>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        let host_ref = self.inner.lock().unwrap().vmid_to_host_ref.get(vmid).cloned()?;

        if let Some(name) = self.inner.lock().unwrap().host_ref_to_host_name.get(&host_ref).cloned()
        {
            return Some(name);
        }

        let name = resolve_host_name(&host_ref)?;
        self.inner
            .lock()
            .unwrap()
            .host_ref_to_host_name
            .insert(host_ref, name.clone());
        Some(name)
    }

    /// Applies one property-stream update, as described in spec.md §4.4:
    /// enter/modify updates are applied property-by-property in place;
    /// leave updates purge all three indices for that VM.
    pub fn apply(&self, update: VmPropertyUpdate) {
        let mut inner = self.inner.lock().unwrap();
        match update {
            VmPropertyUpdate::Changed { vmid, property } => match property {
                VmProperty::GuestHostname(hostname) => {
                    if let Some(old) = inner.vmid_to_hostname.remove(&vmid) {
                        inner.hostname_to_vmid.remove(&old);
                    }
                    inner.vmid_to_hostname.insert(vmid.clone(), hostname.clone());
                    inner.hostname_to_vmid.insert(hostname, vmid);
                }
                VmProperty::RuntimeHostRef(host_ref) => {
                    inner.vmid_to_host_ref.insert(vmid, host_ref);
                }
            },
            VmPropertyUpdate::Left { vmid } => {
                if let Some(hostname) = inner.vmid_to_hostname.remove(&vmid) {
                    inner.hostname_to_vmid.remove(&hostname);
                }
                inner.vmid_to_host_ref.remove(&vmid);
            }
        }
    }
}
