//! Scheduler-extender wire types (spec.md §6). No
//! `k8s.io/kubernetes/pkg/scheduler/api/v1`-equivalent crate exists in
//! this corpus, so the three request/response shapes the extender
//! protocol needs are defined locally rather than reusing a full
//! scheduler-framework dependency.

use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtenderArgs {
    pub pod: Pod,
    pub node_names: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtenderFilterResult {
    pub node_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtenderBindingArgs {
    #[allow(dead_code)]
    pub pod_name: Option<String>,
    #[allow(dead_code)]
    pub pod_namespace: Option<String>,
    #[allow(dead_code)]
    #[serde(rename = "podUID")]
    pub pod_uid: Option<String>,
    #[allow(dead_code)]
    pub node: Option<String>,
}

#[derive(Debug, Serialize, Default)]
pub struct ExtenderBindingResult {
    pub error: Option<String>,
}
