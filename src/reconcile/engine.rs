//! The reconciliation engine: drives one order-confirmation attempt.
//!
//! Per attempt the engine evaluates the order's eligible returnable
//! items, resolves their casco options through the catalog, and either
//! confirms immediately (no eligible items, or exactly one option per
//! item) or hands a zeroed [`ReturnSelection`] back for manual editing.
//! The auto/manual decision is made only after every item's options have
//! been resolved; it is a pure function of the complete option map.
//!
//! A failed submission surfaces the error and leaves the selection
//! untouched, so confirmation can be retried without the driver
//! re-entering anything.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::ApiError;
use crate::catalog::{ContainerCatalog, GroupDirectory};
use crate::models::{ContainerOption, OrderDetail, OrderLineItem};
use crate::reconcile::selection::{ContainerReturn, ReturnPayload, ReturnSelection};

/// Write side of the order-confirmation API, injectable for tests.
#[async_trait]
pub trait DeliveryApi: Send + Sync {
    async fn confirm_delivery(
        &self,
        order_id: i64,
        cascos: Option<&ReturnPayload>,
    ) -> Result<(), ApiError>;
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// Selected totals do not yet match required quantities.
    #[error("casco selection is incomplete")]
    SelectionIncomplete,

    /// Products that resolved to zero casco options; they can never be
    /// completed and must be surfaced, not silently submitted.
    #[error("no casco options available for: {}", .0.join(", "))]
    MissingOptions(Vec<String>),

    /// A confirmation request is already in flight; the action must be
    /// disabled, not queued.
    #[error("a confirmation is already in flight")]
    SubmissionInFlight,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Result of evaluating one confirmation attempt.
#[derive(Debug)]
pub enum ConfirmationOutcome {
    /// The order was submitted and confirmed (trivially or auto-resolved).
    Confirmed,
    /// Ambiguous or missing options; the driver must edit this selection
    /// and the caller then submits it via `submit_selection`.
    ManualSelectionRequired(ReturnSelection),
}

pub struct ReconciliationEngine<D, A> {
    catalog: ContainerCatalog<D>,
    delivery: A,
    in_flight: AtomicBool,
}

impl<D: GroupDirectory, A: DeliveryApi> ReconciliationEngine<D, A> {
    pub fn new(directory: D, delivery: A) -> Self {
        Self {
            catalog: ContainerCatalog::new(directory),
            delivery,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Evaluate the order and either confirm it or return the selection
    /// the driver must complete.
    pub async fn confirm_delivery(
        &self,
        order: &OrderDetail,
    ) -> Result<ConfirmationOutcome, EngineError> {
        let eligible: Vec<OrderLineItem> =
            order.returnable_items().into_iter().cloned().collect();

        if eligible.is_empty() {
            debug!(order_id = order.order.id, "No returnable items, confirming directly");
            self.submit(order.order.id, None).await?;
            return Ok(ConfirmationOutcome::Confirmed);
        }

        let options_map = self
            .catalog
            .find_container_options_for_many(&eligible)
            .await;

        if let Some(auto) = Self::auto_assignment(&eligible, &options_map) {
            info!(order_id = order.order.id, "All items have a single casco, auto-resolving");
            self.submit(order.order.id, Some(&auto)).await?;
            return Ok(ConfirmationOutcome::Confirmed);
        }

        debug!(order_id = order.order.id, "Casco selection requires driver input");
        let pairs: Vec<(OrderLineItem, Vec<_>)> = eligible
            .into_iter()
            .map(|item| {
                let options = item
                    .product_id
                    .and_then(|id| options_map.get(&id).cloned())
                    .unwrap_or_default();
                (item, options)
            })
            .collect();
        Ok(ConfirmationOutcome::ManualSelectionRequired(
            ReturnSelection::new(&pairs),
        ))
    }

    /// Submit a driver-completed selection. The selection is only
    /// borrowed: on failure the caller still holds it and can retry.
    pub async fn submit_selection(
        &self,
        order_id: i64,
        selection: &ReturnSelection,
    ) -> Result<(), EngineError> {
        let blocked: Vec<String> = selection
            .blocked_lines()
            .iter()
            .map(|l| l.product_name.clone())
            .collect();
        if !blocked.is_empty() {
            return Err(EngineError::MissingOptions(blocked));
        }
        if !selection.is_complete() {
            return Err(EngineError::SelectionIncomplete);
        }

        let payload = selection.to_payload();
        self.submit(order_id, Some(&payload)).await
    }

    /// Auto-resolution is possible only when every eligible item carries
    /// a product id and maps to exactly one casco option. Zero options
    /// anywhere is itself ambiguous and forces the manual path.
    fn auto_assignment(
        items: &[OrderLineItem],
        options_map: &BTreeMap<i64, Vec<ContainerOption>>,
    ) -> Option<ReturnPayload> {
        let mut payload = ReturnPayload::new();
        for item in items {
            let product_id = item.product_id?;
            let options = options_map.get(&product_id)?;
            if options.len() != 1 {
                return None;
            }
            if item.quantity > 0 {
                payload.insert(
                    product_id.to_string(),
                    vec![ContainerReturn {
                        container_id: options[0].id,
                        quantity: item.quantity,
                    }],
                );
            }
        }
        Some(payload)
    }

    async fn submit(
        &self,
        order_id: i64,
        cascos: Option<&ReturnPayload>,
    ) -> Result<(), EngineError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            warn!(order_id, "Rejected re-entrant confirmation attempt");
            return Err(EngineError::SubmissionInFlight);
        }
        let result = self.delivery.confirm_delivery(order_id, cascos).await;
        self.in_flight.store(false, Ordering::SeqCst);
        if let Err(ref e) = result {
            warn!(order_id, error = %e, "Delivery confirmation failed");
        }
        result.map_err(EngineError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContainerGroup, ContainerOption, GroupDetail, GroupProduct, ReturnCategory};
    use std::sync::Mutex;

    struct FakeDirectory {
        groups: Vec<(ContainerGroup, GroupDetail, Vec<ContainerOption>)>,
    }

    impl FakeDirectory {
        fn new(defs: &[(i64, &[i64], &[i64])]) -> Self {
            let groups = defs
                .iter()
                .map(|(gid, product_ids, container_ids)| {
                    (
                        ContainerGroup {
                            id: *gid,
                            name: format!("Grupo {gid}"),
                            description: None,
                        },
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
                        container_ids
                            .iter()
                            .map(|cid| ContainerOption {
                                id: *cid,
                                name: format!("Casco {cid}"),
                                group_id: Some(*gid),
                                group_name: None,
                            })
                            .collect(),
                    )
                })
                .collect();
            Self { groups }
        }
    }

    #[async_trait]
    impl GroupDirectory for FakeDirectory {
        async fn fetch_groups(&self) -> Result<Vec<ContainerGroup>, ApiError> {
            Ok(self.groups.iter().map(|(g, _, _)| g.clone()).collect())
        }

        async fn fetch_group_detail(&self, group_id: i64) -> Result<GroupDetail, ApiError> {
            self.groups
                .iter()
                .find(|(g, _, _)| g.id == group_id)
                .map(|(_, d, _)| d.clone())
                .ok_or_else(|| ApiError::NotFound("grupo".to_string()))
        }

        async fn fetch_group_containers(
            &self,
            group_id: i64,
        ) -> Result<Vec<ContainerOption>, ApiError> {
            self.groups
                .iter()
                .find(|(g, _, _)| g.id == group_id)
                .map(|(_, _, c)| c.clone())
                .ok_or_else(|| ApiError::NotFound("grupo".to_string()))
        }
    }

    #[derive(Default)]
    struct FakeDelivery {
        calls: Mutex<Vec<(i64, Option<ReturnPayload>)>>,
        failures_remaining: Mutex<u32>,
    }

    impl FakeDelivery {
        fn failing(times: u32) -> Self {
            Self {
                calls: Mutex::new(vec![]),
                failures_remaining: Mutex::new(times),
            }
        }

        fn calls(&self) -> Vec<(i64, Option<ReturnPayload>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeliveryApi for FakeDelivery {
        async fn confirm_delivery(
            &self,
            order_id: i64,
            cascos: Option<&ReturnPayload>,
        ) -> Result<(), ApiError> {
            self.calls.lock().unwrap().push((order_id, cascos.cloned()));
            let mut failures = self.failures_remaining.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(ApiError::ServerError("indisponível".to_string()));
            }
            Ok(())
        }
    }

    fn order(id: i64, items: &[(Option<i64>, u32, bool, ReturnCategory)]) -> OrderDetail {
        let items = items
            .iter()
            .map(|(product_id, quantity, returnable, category)| OrderLineItem {
                product_id: *product_id,
                name: match product_id {
                    Some(pid) => format!("Produto {pid}"),
                    None => "Produto avulso".to_string(),
                },
                quantity: *quantity,
                unit_price: 100.0,
                returnable: *returnable,
                category: category.clone(),
            })
            .collect();
        let raw = serde_json::json!({ "id": id, "status": "em_entrega" });
        let mut detail: OrderDetail = serde_json::from_value(raw).unwrap();
        detail.items = items;
        detail
    }

    #[tokio::test]
    async fn test_trivial_confirm_without_returnables() {
        let delivery = FakeDelivery::default();
        let engine = ReconciliationEngine::new(FakeDirectory::new(&[]), delivery);
        let order = order(
            1,
            &[(Some(3), 1, false, ReturnCategory::Other("acessorio".into()))],
        );

        let outcome = engine.confirm_delivery(&order).await.unwrap();
        assert!(matches!(outcome, ConfirmationOutcome::Confirmed));
        let calls = engine.delivery.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], (1, None));
    }

    #[tokio::test]
    async fn test_auto_resolve_single_option_per_item() {
        // Property: every eligible item has exactly one option, so the
        // engine confirms without manual selection and assigns each
        // item's full quantity to its single casco.
        let directory = FakeDirectory::new(&[(1, &[5], &[31]), (2, &[6], &[41])]);
        let engine = ReconciliationEngine::new(directory, FakeDelivery::default());
        let order = order(
            2,
            &[
                (Some(5), 2, true, ReturnCategory::GasCylinder),
                (Some(6), 1, true, ReturnCategory::Water),
            ],
        );

        let outcome = engine.confirm_delivery(&order).await.unwrap();
        assert!(matches!(outcome, ConfirmationOutcome::Confirmed));

        let calls = engine.delivery.calls();
        assert_eq!(calls.len(), 1);
        let payload = calls[0].1.as_ref().unwrap();
        assert_eq!(
            payload["5"],
            vec![ContainerReturn { container_id: 31, quantity: 2 }]
        );
        assert_eq!(
            payload["6"],
            vec![ContainerReturn { container_id: 41, quantity: 1 }]
        );
    }

    #[tokio::test]
    async fn test_multiple_options_require_manual_selection() {
        let directory = FakeDirectory::new(&[(1, &[5], &[31, 32])]);
        let engine = ReconciliationEngine::new(directory, FakeDelivery::default());
        let order = order(3, &[(Some(5), 2, true, ReturnCategory::GasCylinder)]);

        let outcome = engine.confirm_delivery(&order).await.unwrap();
        let ConfirmationOutcome::ManualSelectionRequired(selection) = outcome else {
            panic!("expected manual selection");
        };
        assert!(engine.delivery.calls().is_empty());
        assert_eq!(selection.lines().len(), 1);
        assert_eq!(selection.line(5).unwrap().options.len(), 2);
        assert_eq!(selection.line(5).unwrap().selected_total(), 0);
    }

    #[tokio::test]
    async fn test_zero_options_force_manual_even_when_others_are_single() {
        let directory = FakeDirectory::new(&[(1, &[5], &[31])]);
        let engine = ReconciliationEngine::new(directory, FakeDelivery::default());
        let order = order(
            4,
            &[
                (Some(5), 1, true, ReturnCategory::GasCylinder),
                (Some(9), 1, true, ReturnCategory::GasCylinder),
            ],
        );

        let outcome = engine.confirm_delivery(&order).await.unwrap();
        let ConfirmationOutcome::ManualSelectionRequired(selection) = outcome else {
            panic!("expected manual selection");
        };
        let blocked = selection.blocked_lines();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].product_id, 9);

        // The blocked line keeps the selection from ever submitting.
        let err = engine.submit_selection(4, &selection).await.unwrap_err();
        assert!(matches!(err, EngineError::MissingOptions(_)));
        assert!(engine.delivery.calls().is_empty());
    }

    #[tokio::test]
    async fn test_item_without_product_id_forces_manual() {
        let directory = FakeDirectory::new(&[(1, &[5], &[31])]);
        let engine = ReconciliationEngine::new(directory, FakeDelivery::default());
        let order = order(
            5,
            &[
                (Some(5), 1, true, ReturnCategory::GasCylinder),
                (None, 1, true, ReturnCategory::GasCylinder),
            ],
        );

        let outcome = engine.confirm_delivery(&order).await.unwrap();
        let ConfirmationOutcome::ManualSelectionRequired(selection) = outcome else {
            panic!("expected manual selection");
        };
        // The id-less item cannot participate and is excluded from the
        // selection lines.
        assert_eq!(selection.lines().len(), 1);
    }

    #[tokio::test]
    async fn test_incomplete_selection_is_rejected_before_submission() {
        let directory = FakeDirectory::new(&[(1, &[5], &[31, 32])]);
        let engine = ReconciliationEngine::new(directory, FakeDelivery::default());
        let order = order(6, &[(Some(5), 2, true, ReturnCategory::GasCylinder)]);

        let ConfirmationOutcome::ManualSelectionRequired(mut selection) =
            engine.confirm_delivery(&order).await.unwrap()
        else {
            panic!("expected manual selection");
        };

        selection.increment(5, 31, 1);
        let err = engine.submit_selection(6, &selection).await.unwrap_err();
        assert!(matches!(err, EngineError::SelectionIncomplete));
        assert!(engine.delivery.calls().is_empty());
    }

    #[tokio::test]
    async fn test_end_to_end_manual_payload() {
        // Order #42: one gas cylinder, qty 2, options A=31 and B=32,
        // driver selects one of each.
        let directory = FakeDirectory::new(&[(1, &[12], &[31, 32])]);
        let engine = ReconciliationEngine::new(directory, FakeDelivery::default());
        let order = order(42, &[(Some(12), 2, true, ReturnCategory::GasCylinder)]);

        let ConfirmationOutcome::ManualSelectionRequired(mut selection) =
            engine.confirm_delivery(&order).await.unwrap()
        else {
            panic!("expected manual selection");
        };

        assert!(selection.increment(12, 31, 1));
        assert!(selection.increment(12, 32, 1));
        engine.submit_selection(42, &selection).await.unwrap();

        let calls = engine.delivery.calls();
        assert_eq!(calls.len(), 1);
        let payload = serde_json::to_value(calls[0].1.as_ref().unwrap()).unwrap();
        assert_eq!(
            payload,
            serde_json::json!({
                "12": [
                    {"casco_id": 31, "quantidade": 1},
                    {"casco_id": 32, "quantidade": 1}
                ]
            })
        );
    }

    #[tokio::test]
    async fn test_failed_submission_preserves_selection_for_retry() {
        let directory = FakeDirectory::new(&[(1, &[5], &[31, 32])]);
        let engine = ReconciliationEngine::new(directory, FakeDelivery::failing(1));
        let order = order(7, &[(Some(5), 1, true, ReturnCategory::GasCylinder)]);

        let ConfirmationOutcome::ManualSelectionRequired(mut selection) =
            engine.confirm_delivery(&order).await.unwrap()
        else {
            panic!("expected manual selection");
        };
        assert!(selection.increment(5, 31, 1));

        let err = engine.submit_selection(7, &selection).await.unwrap_err();
        assert!(matches!(err, EngineError::Api(ApiError::ServerError(_))));

        // Selection untouched, retry succeeds with the same quantities.
        assert!(selection.is_complete());
        engine.submit_selection(7, &selection).await.unwrap();
        assert_eq!(engine.delivery.calls().len(), 2);
        assert_eq!(engine.delivery.calls()[0].1, engine.delivery.calls()[1].1);
    }

    #[tokio::test]
    async fn test_concurrent_submission_is_rejected_not_queued() {
        use std::sync::atomic::AtomicUsize;
        use std::sync::Arc;
        use tokio::sync::Notify;

        // A delivery that parks inside confirm_delivery until released,
        // so a second submission arrives while the first is in flight.
        struct ParkedDelivery {
            entered: Notify,
            release: Notify,
            calls: AtomicUsize,
        }

        #[async_trait]
        impl DeliveryApi for ParkedDelivery {
            async fn confirm_delivery(
                &self,
                _order_id: i64,
                _cascos: Option<&ReturnPayload>,
            ) -> Result<(), ApiError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.entered.notify_one();
                self.release.notified().await;
                Ok(())
            }
        }

        let delivery = ParkedDelivery {
            entered: Notify::new(),
            release: Notify::new(),
            calls: AtomicUsize::new(0),
        };
        let engine = Arc::new(ReconciliationEngine::new(FakeDirectory::new(&[]), delivery));
        let order = order(9, &[]);

        let first = tokio::spawn({
            let engine = Arc::clone(&engine);
            let order = order.clone();
            async move { engine.confirm_delivery(&order).await }
        });
        engine.delivery.entered.notified().await;

        // Second attempt while the first is parked: rejected, not queued.
        let err = engine.confirm_delivery(&order).await.unwrap_err();
        assert!(matches!(err, EngineError::SubmissionInFlight));

        engine.delivery.release.notify_one();
        let outcome = first.await.unwrap().unwrap();
        assert!(matches!(outcome, ConfirmationOutcome::Confirmed));
        // Only the first submission ever reached the backend.
        assert_eq!(engine.delivery.calls.load(Ordering::SeqCst), 1);

        // The guard is released with the first submission; a fresh
        // attempt goes through.
        let spawned = tokio::spawn({
            let engine = Arc::clone(&engine);
            let order = order.clone();
            async move { engine.confirm_delivery(&order).await }
        });
        engine.delivery.entered.notified().await;
        engine.delivery.release.notify_one();
        assert!(spawned.await.unwrap().is_ok());
        assert_eq!(engine.delivery.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unauthorized_propagates_for_reauth() {
        #[derive(Default)]
        struct ExpiredDelivery;

        #[async_trait]
        impl DeliveryApi for ExpiredDelivery {
            async fn confirm_delivery(
                &self,
                _order_id: i64,
                _cascos: Option<&ReturnPayload>,
            ) -> Result<(), ApiError> {
                Err(ApiError::Unauthorized)
            }
        }

        let engine = ReconciliationEngine::new(FakeDirectory::new(&[]), ExpiredDelivery);
        let order = order(8, &[]);
        let err = engine.confirm_delivery(&order).await.unwrap_err();
        match err {
            EngineError::Api(e) => assert!(e.requires_reauth()),
            other => panic!("unexpected: {other}"),
        }
    }
}
