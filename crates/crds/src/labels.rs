//! Well-known labels, annotations and API coordinates.

/// Pool label listing the ClusterClass names a pool serves (comma separated)
pub const CLUSTER_CLASS_LABEL: &str = "vip.capi.gorizond.io/cluster-class";

/// Pool and claim label carrying the VIP role (comma separated on pools)
pub const ROLE_LABEL: &str = "vip.capi.gorizond.io/role";

/// Annotation and label holding the allocated ingress VIP
pub const INGRESS_VIP_ANNOTATION: &str = "vip.capi.gorizond.io/ingress-vip";

/// Set to "false" to disable ingress VIP allocation for a cluster
pub const INGRESS_ENABLED_ANNOTATION: &str = "vip.capi.gorizond.io/ingress-enabled";

/// Set to "false" to disable control-plane VIP allocation for a cluster
pub const CONTROL_PLANE_ENABLED_ANNOTATION: &str = "vip.capi.gorizond.io/control-plane-enabled";

/// Claim annotation recording when the claim was first requested (RFC 3339)
pub const REQUESTED_AT_ANNOTATION: &str = "vip.capi.gorizond.io/requested-at";

/// Standard Cluster API label naming the owning cluster
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";

pub const IPAM_GROUP: &str = "ipam.cluster.x-k8s.io";
pub const GLOBAL_POOL_KIND: &str = "GlobalInClusterIPPool";
