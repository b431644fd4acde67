//! Unit tests for the claim lifecycle and ownership adoption

#[cfg(test)]
mod tests {
    use crate::error::ControllerError;
    use crate::reconciler::VipRole;
    use crate::test_utils::*;
    use capi_client::MockCapiClient;
    use crds::{CLUSTER_NAME_LABEL, GLOBAL_POOL_KIND, IPAM_GROUP, REQUESTED_AT_ANNOTATION, ROLE_LABEL};
    use kube::ResourceExt;

    fn mock_with_pool() -> MockCapiClient {
        let mock = MockCapiClient::new();
        mock.add_pool(create_test_pool("pool-a", Some("rke2"), Some("control-plane,ingress")));
        mock
    }

    #[test]
    fn test_claim_names_are_deterministic() {
        assert_eq!(VipRole::ControlPlane.claim_name("prod"), "vip-cp-prod");
        assert_eq!(VipRole::Ingress.claim_name("prod"), "vip-ingress-prod");
    }

    #[tokio::test]
    async fn test_ensure_claim_creates_labelled_claim() {
        let mock = mock_with_pool();
        let reconciler = create_test_reconciler(&mock);
        let cluster = create_stored_cluster("c1", "rke2");

        let claim = reconciler
            .ensure_claim(&cluster, VipRole::ControlPlane, Some(cluster_owner(&cluster)))
            .await
            .unwrap();

        assert_eq!(claim.name_any(), "vip-cp-c1");
        assert_eq!(claim.namespace().as_deref(), Some(TEST_NAMESPACE));
        assert_eq!(claim.labels().get(ROLE_LABEL).map(String::as_str), Some("control-plane"));
        assert_eq!(claim.labels().get(CLUSTER_NAME_LABEL).map(String::as_str), Some("c1"));
        assert!(claim.annotations().contains_key(REQUESTED_AT_ANNOTATION));
        assert_eq!(claim.spec.pool_ref.name, "pool-a");
        assert_eq!(claim.spec.pool_ref.kind, GLOBAL_POOL_KIND);
        assert_eq!(claim.spec.pool_ref.api_group, IPAM_GROUP);

        let owners = claim.owner_references();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].uid, "uid-c1");
        assert_eq!(owners[0].controller, Some(true));
    }

    #[tokio::test]
    async fn test_ensure_claim_is_idempotent() {
        let mock = mock_with_pool();
        let reconciler = create_test_reconciler(&mock);
        let cluster = create_stored_cluster("c1", "rke2");

        for _ in 0..3 {
            reconciler
                .ensure_claim(&cluster, VipRole::Ingress, Some(cluster_owner(&cluster)))
                .await
                .unwrap();
        }

        assert_eq!(mock.claim_count(), 1);
        assert_eq!(mock.create_claim_calls(), 1);
        assert_eq!(mock.replace_claim_calls(), 0);
    }

    #[tokio::test]
    async fn test_create_race_resolves_to_winner() {
        let mock = mock_with_pool();
        let reconciler = create_test_reconciler(&mock);
        let cluster = create_stored_cluster("c1", "rke2");
        // The hook got there first, without an owner
        mock.inject_create_race(create_test_claim("c1", "vip-cp-c1", "pool-a"));

        let claim = reconciler
            .ensure_claim(&cluster, VipRole::ControlPlane, Some(cluster_owner(&cluster)))
            .await
            .unwrap();

        assert_eq!(mock.claim_count(), 1);
        assert_eq!(claim.owner_references().len(), 1);
        assert_eq!(mock.replace_claim_calls(), 1);
    }

    #[tokio::test]
    async fn test_no_matching_pool_is_config_error_without_claim() {
        let mock = mock_with_pool();
        let reconciler = create_test_reconciler(&mock);
        let cluster = create_stored_cluster("c2", "other-class");

        let err = reconciler
            .ensure_claim(&cluster, VipRole::ControlPlane, Some(cluster_owner(&cluster)))
            .await
            .unwrap_err();

        match &err {
            ControllerError::NoMatchingPool { class, role } => {
                assert_eq!(class, "other-class");
                assert_eq!(role, "control-plane");
            }
            other => panic!("expected NoMatchingPool, got {:?}", other),
        }
        assert!(!err.is_retryable());
        assert_eq!(mock.claim_count(), 0);
    }

    #[tokio::test]
    async fn test_unstored_cluster_creates_claim_without_owner() {
        let mock = mock_with_pool();
        let reconciler = create_test_reconciler(&mock);
        let cluster = create_test_cluster("c3", "rke2");
        let owner = kube::Resource::controller_owner_ref(&cluster, &());
        assert!(owner.is_none());

        let claim = reconciler.ensure_claim(&cluster, VipRole::ControlPlane, owner).await.unwrap();
        assert!(!claim.has_owner());
    }

    #[tokio::test]
    async fn test_adoption_happens_once() {
        let mock = mock_with_pool();
        mock.add_claim(create_test_claim("c1", "vip-cp-c1", "pool-a"));
        let reconciler = create_test_reconciler(&mock);
        let cluster = create_stored_cluster("c1", "rke2");

        for _ in 0..2 {
            reconciler
                .ensure_claim(&cluster, VipRole::ControlPlane, Some(cluster_owner(&cluster)))
                .await
                .unwrap();
        }

        let stored = mock.claim(TEST_NAMESPACE, "vip-cp-c1").unwrap();
        assert_eq!(stored.owner_references().len(), 1);
        assert_eq!(mock.replace_claim_calls(), 1);
        assert_eq!(mock.create_claim_calls(), 0);
    }

    #[tokio::test]
    async fn test_adoption_conflict_is_retryable() {
        let mock = mock_with_pool();
        mock.add_claim(create_test_claim("c1", "vip-cp-c1", "pool-a"));
        mock.conflict_claim_replaces(1);
        let reconciler = create_test_reconciler(&mock);
        let cluster = create_stored_cluster("c1", "rke2");

        let err = reconciler
            .ensure_claim(&cluster, VipRole::ControlPlane, Some(cluster_owner(&cluster)))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.reason(), "conflict");

        // Next attempt succeeds
        reconciler
            .ensure_claim(&cluster, VipRole::ControlPlane, Some(cluster_owner(&cluster)))
            .await
            .unwrap();
        assert!(mock.claim(TEST_NAMESPACE, "vip-cp-c1").unwrap().has_owner());
    }

    #[tokio::test]
    async fn test_claim_owned_by_someone_else_is_left_alone() {
        let mock = mock_with_pool();
        let mut claim = create_test_claim("c1", "vip-cp-c1", "pool-a");
        let other = create_stored_cluster("someone-else", "rke2");
        claim.metadata.owner_references = Some(vec![cluster_owner(&other)]);
        mock.add_claim(claim);
        let reconciler = create_test_reconciler(&mock);
        let cluster = create_stored_cluster("c1", "rke2");

        let claim = reconciler
            .ensure_claim(&cluster, VipRole::ControlPlane, Some(cluster_owner(&cluster)))
            .await
            .unwrap();
        assert_eq!(claim.owner_references()[0].uid, "uid-someone-else");
        assert_eq!(mock.replace_claim_calls(), 0);
    }

    #[tokio::test]
    async fn test_adopt_existing_claim_never_creates() {
        let mock = mock_with_pool();
        let reconciler = create_test_reconciler(&mock);
        let cluster = create_stored_cluster("c1", "rke2");

        let adopted = reconciler
            .adopt_existing_claim(&cluster, VipRole::ControlPlane, Some(cluster_owner(&cluster)))
            .await
            .unwrap();
        assert!(adopted.is_none());
        assert_eq!(mock.create_claim_calls(), 0);
    }
}
