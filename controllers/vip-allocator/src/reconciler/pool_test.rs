//! Unit tests for pool selection

#[cfg(test)]
mod tests {
    use crate::error::ControllerError;
    use crate::reconciler::pool::pool_matches;
    use crate::reconciler::VipRole;
    use crate::test_utils::*;
    use capi_client::MockCapiClient;

    #[test]
    fn test_multi_value_labels_match_members() {
        let pool = create_test_pool("pool-a", Some("a, b ,c"), Some("control-plane,ingress"));

        assert!(pool_matches(&pool, "b", "ingress"));
        assert!(pool_matches(&pool, "a", "control-plane"));
        assert!(!pool_matches(&pool, "b", "other"));
        assert!(!pool_matches(&pool, "d", "ingress"));
        // Substrings of a listed value are not members
        assert!(!pool_matches(&pool, "", "ingress"));
        assert!(!pool_matches(&pool, "b", "control"));
    }

    #[test]
    fn test_pool_without_both_labels_never_matches() {
        let no_role = create_test_pool("pool-a", Some("rke2"), None);
        let no_class = create_test_pool("pool-b", None, Some("control-plane"));

        assert!(!pool_matches(&no_role, "rke2", "control-plane"));
        assert!(!pool_matches(&no_class, "rke2", "control-plane"));
    }

    #[tokio::test]
    async fn test_resolve_pool_picks_lexicographically_first_match() {
        let mock = MockCapiClient::new();
        mock.add_pool(create_test_pool("pool-z", Some("rke2"), Some("control-plane")));
        mock.add_pool(create_test_pool("pool-m", Some("rke2,k3s"), Some("control-plane")));
        mock.add_pool(create_test_pool("pool-a", Some("k3s"), Some("control-plane")));
        let reconciler = create_test_reconciler(&mock);

        let pool = reconciler.resolve_pool("rke2", VipRole::ControlPlane).await.unwrap();
        assert_eq!(pool.as_deref(), Some("pool-m"));

        let text = reconciler.metrics().render().unwrap();
        assert!(text.contains("capi_vip_allocator_pools_available{cluster_class=\"rke2\",role=\"control-plane\"} 2"));
        assert!(text.contains("capi_vip_allocator_pool_addresses_total{pool_name=\"pool-a\"} 11"));
    }

    #[tokio::test]
    async fn test_resolve_pool_no_match_is_not_an_error() {
        let mock = MockCapiClient::new();
        mock.add_pool(create_test_pool("pool-a", Some("rke2"), Some("ingress")));
        let reconciler = create_test_reconciler(&mock);

        let pool = reconciler.resolve_pool("rke2", VipRole::ControlPlane).await.unwrap();
        assert!(pool.is_none());
    }

    #[tokio::test]
    async fn test_resolve_pool_list_failure_is_backend_error() {
        let mock = MockCapiClient::new();
        mock.set_list_pools_error(Some("etcd unavailable"));
        let reconciler = create_test_reconciler(&mock);

        let err = reconciler.resolve_pool("rke2", VipRole::Ingress).await.unwrap_err();
        assert!(matches!(err, ControllerError::Backend { .. }));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("class rke2 role ingress"));
    }
}
