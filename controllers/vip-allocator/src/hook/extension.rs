//! VIP runtime extension
//!
//! Allocates the control-plane VIP while the topology controller computes
//! patches for a new Cluster, before the Cluster is stored. The VIP comes
//! back as JSON patches on the Cluster (endpoint and, when the ClusterClass
//! declares it, the VIP variable) and on the matching infrastructure
//! cluster. Claims created here have no owner yet; the background
//! reconciler adopts them once the Cluster exists.

use super::types::{
    DiscoveryResponse, ExtensionHandler, FailurePolicy, GeneratePatchesRequest, GeneratePatchesRequestItem,
    GeneratePatchesResponse, GeneratePatchesResponseItem, GroupVersionHook, LifecycleRequest, LifecycleResponse,
    PatchType, ResponseStatus, Variable, HOOKS_API_VERSION,
};
use crate::error::ControllerError;
use crate::reconciler::address::pending_for;
use crate::reconciler::claim::cluster_namespace;
use crate::reconciler::{Reconciler, VipRole};
use chrono::Utc;
use crds::Cluster;
use kube::{Resource, ResourceExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info};

pub const GENERATE_PATCHES: &str = "GeneratePatches";
pub const BEFORE_CLUSTER_CREATE: &str = "BeforeClusterCreate";
pub const BEFORE_CLUSTER_DELETE: &str = "BeforeClusterDelete";
pub const AFTER_CLUSTER_UPGRADE: &str = "AfterClusterUpgrade";

/// Timeout advertised for the lifecycle hooks, which only acknowledge.
const LIFECYCLE_TIMEOUT_SECONDS: i32 = 10;

/// Whether an object is an infrastructure cluster (e.g. `ProxmoxCluster`
/// in `infrastructure.cluster.x-k8s.io`).
pub fn is_infrastructure_cluster(api_version: &str, kind: &str) -> bool {
    const PREFIX: &str = "infrastructure";
    let group = api_version.rsplit_once('/').map(|(g, _)| g).unwrap_or_default();
    group.starts_with(PREFIX) && group.len() > PREFIX.len() && kind.ends_with("Cluster") && kind != "Cluster"
}

fn secs(d: Duration) -> i32 {
    i32::try_from(d.as_secs()).unwrap_or(i32::MAX)
}

fn status_label(status: ResponseStatus) -> &'static str {
    match status {
        ResponseStatus::Success => "Success",
        ResponseStatus::Failure => "Failure",
    }
}

fn endpoint_op(endpoint: &Value) -> Value {
    json!({"op": "add", "path": "/spec/controlPlaneEndpoint", "value": endpoint})
}

/// JSON patch op that sets topology variable `name`, based on what the raw
/// object already carries.
fn variable_op(object: &Value, name: &str, value: &str) -> Value {
    match object.pointer("/spec/topology/variables").and_then(Value::as_array) {
        Some(vars) => match vars.iter().position(|v| v["name"] == name) {
            Some(i) => json!({
                "op": "replace",
                "path": format!("/spec/topology/variables/{}/value", i),
                "value": value,
            }),
            None => json!({
                "op": "add",
                "path": "/spec/topology/variables/-",
                "value": {"name": name, "value": value},
            }),
        },
        None => json!({
            "op": "add",
            "path": "/spec/topology/variables",
            "value": [{"name": name, "value": value}],
        }),
    }
}

/// Non-empty string value of variable `name`, item variables first.
fn variable_value(item: &GeneratePatchesRequestItem, shared: &[Variable], name: &str) -> Option<String> {
    item.variables
        .iter()
        .chain(shared)
        .find(|v| v.name == name)
        .and_then(|v| v.value.as_str())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Why a GeneratePatches call failed, as reported back to Cluster API.
#[derive(Debug)]
struct HookFailure {
    message: String,
    retry_after_seconds: Option<i32>,
}

/// Runtime extension handlers backed by the shared allocation engine.
pub struct VipExtension {
    reconciler: Arc<Reconciler>,
}

impl VipExtension {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }

    pub fn name(&self) -> &str {
        &self.reconciler.config().extension_name
    }

    fn retry_after(&self) -> i32 {
        secs(self.reconciler.config().requeue_delay).max(1)
    }

    /// Handlers this extension registers with Cluster API.
    pub fn discovery(&self) -> DiscoveryResponse {
        let handler = |suffix: &str, hook: &str, timeout: i32, policy: FailurePolicy| ExtensionHandler {
            name: format!("{}-{}", self.name(), suffix),
            request_hook: GroupVersionHook {
                api_version: HOOKS_API_VERSION.to_string(),
                hook: hook.to_string(),
            },
            timeout_seconds: Some(timeout),
            failure_policy: Some(policy),
        };

        let response = DiscoveryResponse {
            api_version: HOOKS_API_VERSION.to_string(),
            kind: "DiscoveryResponse".to_string(),
            status: ResponseStatus::Success,
            message: String::new(),
            handlers: vec![
                handler(
                    "generate-patches",
                    GENERATE_PATCHES,
                    secs(self.reconciler.config().hook_timeout),
                    FailurePolicy::Fail,
                ),
                handler("before-create", BEFORE_CLUSTER_CREATE, LIFECYCLE_TIMEOUT_SECONDS, FailurePolicy::Ignore),
                handler("before-delete", BEFORE_CLUSTER_DELETE, LIFECYCLE_TIMEOUT_SECONDS, FailurePolicy::Ignore),
                handler("after-upgrade", AFTER_CLUSTER_UPGRADE, LIFECYCLE_TIMEOUT_SECONDS, FailurePolicy::Ignore),
            ],
        };
        self.reconciler.metrics().record_hook_request("Discovery", "Success");
        response
    }

    /// Allocate VIPs for the Clusters in the request and return the patches.
    ///
    /// Polling for every item shares one deadline, the poll timeout. The
    /// request as a whole is cut off between that deadline and the timeout
    /// advertised in discovery, so a failure always reaches Cluster API in
    /// time. Any allocation failure fails the request; a timeout additionally
    /// asks Cluster API to retry.
    pub async fn generate_patches(&self, request: &GeneratePatchesRequest) -> GeneratePatchesResponse {
        info!("GeneratePatches called with {} items", request.items.len());
        let config = self.reconciler.config();
        let budget = config.hook_poll_timeout;
        let started = Instant::now();
        let deadline = started + budget;
        let cutoff = deadline + config.hook_timeout.saturating_sub(budget) / 2;

        let response = match tokio::time::timeout_at(cutoff, self.patch_items(request, deadline)).await {
            Ok(Ok(items)) => {
                info!("GeneratePatches returning {} patches", items.len());
                GeneratePatchesResponse::success(items)
            }
            Ok(Err(failure)) => {
                error!("GeneratePatches failed: {}", failure.message);
                GeneratePatchesResponse::failure(failure.message, failure.retry_after_seconds)
            }
            Err(_) => {
                let elapsed = cutoff.duration_since(started);
                error!("GeneratePatches did not finish within {:?}", elapsed);
                GeneratePatchesResponse::failure(
                    format!("VIP allocation did not finish within {:?}", elapsed),
                    Some(self.retry_after()),
                )
            }
        };

        self.reconciler
            .metrics()
            .record_hook_request(GENERATE_PATCHES, status_label(response.status));
        response
    }

    async fn patch_items(
        &self,
        request: &GeneratePatchesRequest,
        deadline: Instant,
    ) -> Result<Vec<GeneratePatchesResponseItem>, HookFailure> {
        let config = self.reconciler.config();
        // Cluster name -> endpoint value, for the infrastructure pass
        let mut endpoints: HashMap<String, Value> = HashMap::new();
        let mut items = Vec::new();

        for item in request.items.iter().filter(|i| i.object["kind"] == "Cluster") {
            let cluster: Cluster = serde_json::from_value(item.object.clone()).map_err(|e| HookFailure {
                message: format!("failed to decode Cluster in item {}: {}", item.uid, e),
                retry_after_seconds: None,
            })?;
            let name = cluster.name_any();

            let Some(class) = cluster.class_name() else {
                debug!("Cluster {} has no topology class, skipping", name);
                continue;
            };

            let current = &cluster.spec.control_plane_endpoint;
            let port = if current.port == 0 { config.default_port } else { current.port };
            if !current.host.is_empty() {
                debug!("Cluster {} already has controlPlaneEndpoint {}", name, current.host);
                endpoints.insert(name, json!({"host": current.host, "port": port}));
                continue;
            }

            if let Some(vip) = variable_value(item, &request.variables, &config.vip_variable_name) {
                info!("Cluster {} requests VIP {} through {}", name, vip, config.vip_variable_name);
                let endpoint = json!({"host": vip, "port": port});
                items.push(self.patch_item(&item.uid, vec![endpoint_op(&endpoint)])?);
                endpoints.insert(name, endpoint);
                continue;
            }

            let address = self.allocate(&cluster, class, deadline).await.map_err(|e| self.failure(&cluster, e))?;
            let endpoint = json!({"host": address, "port": port});
            let mut ops = vec![endpoint_op(&endpoint)];

            let namespace = cluster_namespace(&cluster).map_err(|e| self.failure(&cluster, e))?;
            if self
                .reconciler
                .class_declares_variable(class, &namespace)
                .await
                .map_err(|e| self.failure(&cluster, e))?
            {
                ops.push(variable_op(&item.object, &config.vip_variable_name, &address));
            }

            info!("Allocated VIP {} for Cluster {}/{}", address, namespace, name);
            items.push(self.patch_item(&item.uid, ops)?);
            endpoints.insert(name, endpoint);
        }

        for item in &request.items {
            let api_version = item.object["apiVersion"].as_str().unwrap_or_default();
            let kind = item.object["kind"].as_str().unwrap_or_default();
            if !is_infrastructure_cluster(api_version, kind) {
                continue;
            }
            let Some(name) = item.object.pointer("/metadata/name").and_then(Value::as_str) else {
                continue;
            };
            let Some(endpoint) = endpoints.get(name) else {
                continue;
            };
            if item.object.pointer("/spec/controlPlaneEndpoint").is_none() {
                debug!("{} {} has no controlPlaneEndpoint, not patching", kind, name);
                continue;
            }
            info!("Patching {} {} with controlPlaneEndpoint {}", kind, name, endpoint["host"]);
            items.push(self.patch_item(&item.uid, vec![endpoint_op(endpoint)])?);
        }

        Ok(items)
    }

    /// Claim a control-plane VIP for `cluster` and wait for it to be bound.
    async fn allocate(&self, cluster: &Cluster, class: &str, deadline: Instant) -> Result<String, ControllerError> {
        let role = VipRole::ControlPlane;
        let metrics = self.reconciler.metrics();
        let result = async {
            let namespace = cluster_namespace(cluster)?;
            // Without a uid (cluster not stored yet) the claim is created unowned
            let owner = cluster.controller_owner_ref(&());
            let claim = self.reconciler.ensure_claim(cluster, role, owner).await?;
            let address = self.reconciler.wait_for_address(&namespace, &claim.name_any(), deadline).await?;
            Ok::<_, ControllerError>((claim, address))
        }
        .await;

        match result {
            Ok((claim, address)) => {
                metrics.record_allocation(role.as_str(), class, pending_for(&claim, Utc::now()));
                Ok(address)
            }
            Err(e) => {
                metrics.record_allocation_error(role.as_str(), class, e.reason());
                Err(e)
            }
        }
    }

    fn failure(&self, cluster: &Cluster, error: ControllerError) -> HookFailure {
        let retry_after_seconds =
            matches!(error, ControllerError::AllocationTimeout { .. }).then(|| self.retry_after());
        HookFailure {
            message: format!(
                "failed to allocate VIP for Cluster {}/{}: {}",
                cluster.namespace().unwrap_or_default(),
                cluster.name_any(),
                error
            ),
            retry_after_seconds,
        }
    }

    fn patch_item(&self, uid: &str, ops: Vec<Value>) -> Result<GeneratePatchesResponseItem, HookFailure> {
        let patch = serde_json::to_vec(&Value::Array(ops)).map_err(|e| HookFailure {
            message: format!("failed to encode patch for item {}: {}", uid, e),
            retry_after_seconds: None,
        })?;
        Ok(GeneratePatchesResponseItem {
            uid: uid.to_string(),
            patch_type: PatchType::JsonPatch,
            patch,
        })
    }

    /// Acknowledge a lifecycle hook. Claims are released through owner
    /// references, so there is nothing to do here.
    pub fn lifecycle(&self, hook: &str, request: &LifecycleRequest) -> LifecycleResponse {
        if hook == BEFORE_CLUSTER_DELETE {
            info!(
                "{} for Cluster {}: IPAddressClaims are released through owner references",
                hook,
                request.cluster_key()
            );
        } else {
            info!("{} for Cluster {} acknowledged", hook, request.cluster_key());
        }
        self.reconciler.metrics().record_hook_request(hook, "Success");
        LifecycleResponse {
            api_version: HOOKS_API_VERSION.to_string(),
            kind: format!("{}Response", hook),
            status: ResponseStatus::Success,
            message: String::new(),
            retry_after_seconds: None,
        }
    }
}
