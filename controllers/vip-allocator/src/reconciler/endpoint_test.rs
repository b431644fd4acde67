//! Unit tests for writing VIPs back to clusters

#[cfg(test)]
mod tests {
    use crate::error::ControllerError;
    use crate::reconciler::endpoint::is_valid_label_value;
    use crate::test_utils::*;
    use capi_client::MockCapiClient;
    use crds::{ClusterVariable, INGRESS_VIP_ANNOTATION};
    use kube::ResourceExt;
    use serde_json::json;

    fn stored(mock: &MockCapiClient, name: &str) -> crds::Cluster {
        mock.add_cluster(create_stored_cluster(name, "rke2"));
        mock.cluster(TEST_NAMESPACE, name).unwrap()
    }

    #[test]
    fn test_label_value_validation() {
        assert!(is_valid_label_value("10.0.0.1"));
        assert!(is_valid_label_value(""));
        assert!(!is_valid_label_value("fd00::1"));
        assert!(!is_valid_label_value("-10.0.0.1"));
        assert!(!is_valid_label_value(&"a".repeat(64)));
    }

    #[tokio::test]
    async fn test_endpoint_and_variable_when_class_declares_it() {
        let mock = MockCapiClient::new();
        mock.add_cluster_class(create_test_cluster_class("rke2", None, &["clusterVip"]));
        let cluster = stored(&mock, "c1");
        let reconciler = create_test_reconciler(&mock);

        let patched = reconciler.patch_control_plane_endpoint(&cluster, "10.0.0.15").await.unwrap();

        assert_eq!(patched.spec.control_plane_endpoint.host, "10.0.0.15");
        assert_eq!(patched.spec.control_plane_endpoint.port, 6443);
        let vars = &patched.spec.topology.as_ref().unwrap().variables;
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].name, "clusterVip");
        assert_eq!(vars[0].value, json!("10.0.0.15"));

        let patches = mock.cluster_patches();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0]["spec"]["controlPlaneEndpoint"], json!({"host": "10.0.0.15", "port": 6443}));
        // Only the changed fields are sent
        assert!(patches[0].get("metadata").is_none());
    }

    #[tokio::test]
    async fn test_endpoint_only_when_class_lacks_variable() {
        let mock = MockCapiClient::new();
        mock.add_cluster_class(create_test_cluster_class("rke2", None, &["other"]));
        let cluster = stored(&mock, "c1");
        let reconciler = create_test_reconciler(&mock);

        let patched = reconciler.patch_control_plane_endpoint(&cluster, "10.0.0.15").await.unwrap();

        assert_eq!(patched.spec.control_plane_endpoint.host, "10.0.0.15");
        assert!(patched.spec.topology.as_ref().unwrap().variables.is_empty());
        assert!(mock.cluster_patches()[0]["spec"].get("topology").is_none());
    }

    #[tokio::test]
    async fn test_existing_port_is_preserved() {
        let mock = MockCapiClient::new();
        mock.add_cluster_class(create_test_cluster_class("rke2", None, &[]));
        let mut cluster = create_stored_cluster("c1", "rke2");
        cluster.spec.control_plane_endpoint.port = 9345;
        mock.add_cluster(cluster);
        let cluster = mock.cluster(TEST_NAMESPACE, "c1").unwrap();
        let reconciler = create_test_reconciler(&mock);

        let patched = reconciler.patch_control_plane_endpoint(&cluster, "10.0.0.15").await.unwrap();
        assert_eq!(patched.spec.control_plane_endpoint.port, 9345);
    }

    #[tokio::test]
    async fn test_existing_variable_is_replaced_not_duplicated() {
        let mock = MockCapiClient::new();
        mock.add_cluster_class(create_test_cluster_class("rke2", None, &["clusterVip"]));
        let mut cluster = create_stored_cluster("c1", "rke2");
        if let Some(topology) = cluster.spec.topology.as_mut() {
            topology.variables = vec![
                ClusterVariable { name: "region".to_string(), definition_from: None, value: json!("eu") },
                ClusterVariable { name: "clusterVip".to_string(), definition_from: None, value: json!("") },
            ];
        }
        mock.add_cluster(cluster);
        let cluster = mock.cluster(TEST_NAMESPACE, "c1").unwrap();
        let reconciler = create_test_reconciler(&mock);

        let patched = reconciler.patch_control_plane_endpoint(&cluster, "10.0.0.15").await.unwrap();
        let vars = &patched.spec.topology.as_ref().unwrap().variables;
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].value, json!("eu"));
        assert_eq!(vars[1].value, json!("10.0.0.15"));
    }

    #[tokio::test]
    async fn test_namespaced_class_is_found_as_fallback() {
        let mock = MockCapiClient::new();
        mock.add_cluster_class(create_test_cluster_class("rke2", Some(TEST_NAMESPACE), &["clusterVip"]));
        let reconciler = create_test_reconciler(&mock);

        assert!(reconciler.class_declares_variable("rke2", TEST_NAMESPACE).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_class_is_error_and_nothing_is_patched() {
        let mock = MockCapiClient::new();
        let cluster = stored(&mock, "c1");
        let reconciler = create_test_reconciler(&mock);

        let err = reconciler
            .patch_control_plane_endpoint(&cluster, "10.0.0.15")
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::Backend { .. }));
        assert!(mock.cluster_patches().is_empty());
    }

    #[tokio::test]
    async fn test_ingress_sets_annotation_and_label() {
        let mock = MockCapiClient::new();
        let cluster = stored(&mock, "c1");
        let reconciler = create_test_reconciler(&mock);

        let patched = reconciler.patch_ingress_vip(&cluster, "10.0.1.5").await.unwrap();
        assert_eq!(patched.annotation(INGRESS_VIP_ANNOTATION), Some("10.0.1.5"));
        assert_eq!(patched.labels().get(INGRESS_VIP_ANNOTATION).map(String::as_str), Some("10.0.1.5"));
        // Endpoint untouched
        assert!(patched.spec.control_plane_endpoint.host.is_empty());
    }

    #[tokio::test]
    async fn test_ingress_skips_invalid_label_value() {
        let mock = MockCapiClient::new();
        let cluster = stored(&mock, "c1");
        let reconciler = create_test_reconciler(&mock);

        let patched = reconciler.patch_ingress_vip(&cluster, "fd00::10").await.unwrap();
        assert_eq!(patched.annotation(INGRESS_VIP_ANNOTATION), Some("fd00::10"));
        assert!(!patched.labels().contains_key(INGRESS_VIP_ANNOTATION));
    }

    #[tokio::test]
    async fn test_unchanged_cluster_sends_no_patch() {
        let mock = MockCapiClient::new();
        let cluster = stored(&mock, "c1");
        let reconciler = create_test_reconciler(&mock);

        let once = reconciler.patch_ingress_vip(&cluster, "10.0.1.5").await.unwrap();
        let twice = reconciler.patch_ingress_vip(&once, "10.0.1.5").await.unwrap();

        assert_eq!(mock.cluster_patches().len(), 1);
        assert_eq!(twice.annotation(INGRESS_VIP_ANNOTATION), Some("10.0.1.5"));
    }
}
