//! Container catalog lookup: product → group → casco options.
//!
//! The backend has no reverse index from product to group, so the lookup
//! fetches the group list and scans each group's member products until
//! one contains the target product. O(products × groups) by
//! construction; group counts are small in practice and the design must
//! not assume a reverse index exists.
//!
//! Every fetch failure degrades to "no options for this product" rather
//! than aborting: a missing option set is surfaced to the driver through
//! the manual-selection path, never as a crash.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::api::ApiError;
use crate::models::{ContainerGroup, ContainerOption, GroupDetail, OrderLineItem};

/// Read side of the container-group API, injectable for tests.
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    async fn fetch_groups(&self) -> Result<Vec<ContainerGroup>, ApiError>;
    async fn fetch_group_detail(&self, group_id: i64) -> Result<GroupDetail, ApiError>;
    async fn fetch_group_containers(&self, group_id: i64)
        -> Result<Vec<ContainerOption>, ApiError>;
}

pub struct ContainerCatalog<D> {
    directory: D,
}

impl<D: GroupDirectory> ContainerCatalog<D> {
    pub fn new(directory: D) -> Self {
        Self { directory }
    }

    /// Find the casco options available for one product via its group.
    /// Returns an empty list when the product belongs to no group or any
    /// fetch along the way fails.
    pub async fn find_container_options(&self, product_id: i64) -> Vec<ContainerOption> {
        let groups = match self.directory.fetch_groups().await {
            Ok(groups) => groups,
            Err(e) => {
                warn!(error = %e, "Failed to fetch container groups");
                return vec![];
            }
        };
        self.find_in_groups(&groups, product_id).await
    }

    /// Batch variant: fetches the group list once and resolves each item
    /// against it. Items without a product id are skipped. Per-product
    /// failures leave that product with an empty option list.
    pub async fn find_container_options_for_many(
        &self,
        items: &[OrderLineItem],
    ) -> BTreeMap<i64, Vec<ContainerOption>> {
        let groups = match self.directory.fetch_groups().await {
            Ok(groups) => groups,
            Err(e) => {
                warn!(error = %e, "Failed to fetch container groups for batch lookup");
                vec![]
            }
        };

        let mut options_by_product = BTreeMap::new();
        for item in items {
            let Some(product_id) = item.product_id else {
                debug!(name = %item.name, "Skipping item without product id");
                continue;
            };
            let options = self.find_in_groups(&groups, product_id).await;
            debug!(product_id, count = options.len(), "Resolved casco options");
            options_by_product.insert(product_id, options);
        }
        options_by_product
    }

    async fn find_in_groups(
        &self,
        groups: &[ContainerGroup],
        product_id: i64,
    ) -> Vec<ContainerOption> {
        for group in groups {
            let detail = match self.directory.fetch_group_detail(group.id).await {
                Ok(detail) => detail,
                Err(e) => {
                    warn!(group_id = group.id, error = %e, "Failed to fetch group detail");
                    continue;
                }
            };

            if detail.products.iter().any(|p| p.matches(product_id)) {
                // A product belongs to at most one group in practice; the
                // data model does not enforce that, so first match wins.
                return match self.directory.fetch_group_containers(group.id).await {
                    Ok(containers) => containers,
                    Err(e) => {
                        warn!(group_id = group.id, error = %e, "Failed to fetch group cascos");
                        vec![]
                    }
                };
            }
        }

        debug!(product_id, "Product not found in any container group");
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GroupProduct, ReturnCategory};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeDirectory {
        groups: Vec<ContainerGroup>,
        details: BTreeMap<i64, GroupDetail>,
        containers: BTreeMap<i64, Vec<ContainerOption>>,
        failing_details: Vec<i64>,
        group_fetches: AtomicUsize,
        detail_fetches: AtomicUsize,
    }

    impl FakeDirectory {
        fn new() -> Self {
            Self {
                groups: vec![],
                details: BTreeMap::new(),
                containers: BTreeMap::new(),
                failing_details: vec![],
                group_fetches: AtomicUsize::new(0),
                detail_fetches: AtomicUsize::new(0),
            }
        }

        fn with_group(mut self, id: i64, product_ids: &[i64], containers: &[i64]) -> Self {
            self.groups.push(ContainerGroup {
                id,
                name: format!("Grupo {id}"),
                description: None,
            });
            self.details.insert(
                id,
                GroupDetail {
                    products: product_ids
                        .iter()
                        .map(|pid| GroupProduct {
                            product_id: Some(*pid),
                            name: format!("Produto {pid}"),
                            category: None,
                        })
                        .collect(),
                },
            );
            self.containers.insert(
                id,
                containers
                    .iter()
                    .map(|cid| ContainerOption {
                        id: *cid,
                        name: format!("Casco {cid}"),
                        group_id: Some(id),
                        group_name: Some(format!("Grupo {id}")),
                    })
                    .collect(),
            );
            self
        }
    }

    #[async_trait]
    impl GroupDirectory for FakeDirectory {
        async fn fetch_groups(&self) -> Result<Vec<ContainerGroup>, ApiError> {
            self.group_fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.groups.clone())
        }

        async fn fetch_group_detail(&self, group_id: i64) -> Result<GroupDetail, ApiError> {
            self.detail_fetches.fetch_add(1, Ordering::SeqCst);
            if self.failing_details.contains(&group_id) {
                return Err(ApiError::ServerError("boom".to_string()));
            }
            Ok(self.details[&group_id].clone())
        }

        async fn fetch_group_containers(
            &self,
            group_id: i64,
        ) -> Result<Vec<ContainerOption>, ApiError> {
            Ok(self.containers[&group_id].clone())
        }
    }

    fn line_item(product_id: i64) -> OrderLineItem {
        OrderLineItem {
            product_id: Some(product_id),
            name: format!("Produto {product_id}"),
            quantity: 1,
            unit_price: 100.0,
            returnable: true,
            category: ReturnCategory::GasCylinder,
        }
    }

    #[tokio::test]
    async fn test_first_matching_group_wins() {
        // Product 5 is (incorrectly) listed in both groups; only the
        // first group's cascos are returned and scanning stops there.
        let dir = FakeDirectory::new()
            .with_group(1, &[5], &[31])
            .with_group(2, &[5], &[32]);
        let catalog = ContainerCatalog::new(dir);

        let options = catalog.find_container_options(5).await;
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].id, 31);
        assert_eq!(catalog.directory.detail_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_product_in_no_group() {
        let dir = FakeDirectory::new().with_group(1, &[5], &[31]);
        let catalog = ContainerCatalog::new(dir);
        assert!(catalog.find_container_options(99).await.is_empty());
    }

    #[tokio::test]
    async fn test_detail_failure_skips_group() {
        let mut dir = FakeDirectory::new()
            .with_group(1, &[5], &[31])
            .with_group(2, &[5], &[32]);
        dir.failing_details.push(1);
        let catalog = ContainerCatalog::new(dir);

        let options = catalog.find_container_options(5).await;
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].id, 32);
    }

    #[tokio::test]
    async fn test_batch_fetches_group_list_once() {
        let dir = FakeDirectory::new()
            .with_group(1, &[5], &[31])
            .with_group(2, &[6], &[32, 33]);
        let catalog = ContainerCatalog::new(dir);

        let items = [line_item(5), line_item(6), line_item(7)];
        let map = catalog.find_container_options_for_many(&items).await;

        assert_eq!(catalog.directory.group_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(map[&5].len(), 1);
        assert_eq!(map[&6].len(), 2);
        assert!(map[&7].is_empty());
    }

    #[tokio::test]
    async fn test_batch_skips_items_without_product_id() {
        let dir = FakeDirectory::new().with_group(1, &[5], &[31]);
        let catalog = ContainerCatalog::new(dir);

        let mut item = line_item(5);
        item.product_id = None;
        let map = catalog.find_container_options_for_many(&[item]).await;
        assert!(map.is_empty());
    }
}
