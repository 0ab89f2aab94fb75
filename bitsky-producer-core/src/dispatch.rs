//! Fan-out of reconciled results to target systems and the control plane.

use crate::api::{join_url, ControlPlane, TargetSystem};
use crate::config::ResolvedConfig;
use crate::types::{Intelligence, IntelligenceState, Soi};
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

/// Items bound for one `(method, url)` destination. Keeps the first
/// observed SOI descriptor for the group.
pub(crate) struct Bucket {
    pub soi: Soi,
    pub items: Vec<Intelligence>,
}

/// Bucket reconciled items by destination.
///
/// Items without a complete callback (base URL, method, path) cannot be
/// delivered anywhere and are dropped with a debug log.
pub(crate) fn group_by_destination(items: Vec<Intelligence>) -> IndexMap<String, Bucket> {
    let mut buckets: IndexMap<String, Bucket> = IndexMap::new();
    for item in items {
        let Some(soi) = item.soi.clone() else {
            tracing::debug!("intelligence {} has no soi; skipping delivery", item.global_id);
            continue;
        };
        let (Some(base_url), Some(method), Some(path)) = (
            soi.base_url.as_deref(),
            soi.callback_method(),
            soi.callback_path(),
        ) else {
            tracing::debug!(
                "intelligence {} has an incomplete soi callback; skipping delivery",
                item.global_id
            );
            continue;
        };

        let key = format!(
            "{}:{}",
            method.to_lowercase(),
            join_url(base_url, path).to_lowercase()
        );
        buckets
            .entry(key)
            .or_insert_with(|| Bucket {
                soi: soi.clone(),
                items: Vec::new(),
            })
            .items
            .push(item);
    }
    buckets
}

/// Report reconciled intelligences to their SOIs and the control plane.
///
/// Buckets run concurrently. Within a bucket the SOI POST strictly precedes
/// the control-plane update; an SOI failure rewrites that bucket's items to
/// `FAILED` before they are reported upstream. Nothing here propagates:
/// a failed control-plane update is logged and left for redelivery.
pub(crate) async fn dispatch_results(
    control_plane: &Arc<dyn ControlPlane>,
    target_system: &Arc<dyn TargetSystem>,
    resolved: &ResolvedConfig,
    items: Vec<Intelligence>,
) {
    let buckets = group_by_destination(items);
    let deliveries = buckets.into_iter().map(|(key, bucket)| {
        let control_plane = Arc::clone(control_plane);
        let target_system = Arc::clone(target_system);
        async move {
            let Bucket { soi, mut items } = bucket;
            if let Err(err) = target_system.deliver(&soi, &items).await {
                tracing::warn!("delivery to {} failed: {}", key, err);
                let reason = serde_json::to_value(&err)
                    .unwrap_or_else(|_| Value::String(err.to_string()));
                for item in &mut items {
                    item.set_state(IntelligenceState::Failed, Some(&reason));
                }
            }
            if let Err(err) = control_plane.update_intelligences(resolved, &items).await {
                tracing::warn!(
                    "control-plane update for {} failed; leaving items for redelivery: {}",
                    key,
                    err
                );
            }
        }
    });
    futures::future::join_all(deliveries).await;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ProducerError;
    use crate::types::SoiCallback;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    fn routed_item(global_id: &str, base_url: &str, method: &str, path: &str) -> Intelligence {
        Intelligence {
            global_id: global_id.to_string(),
            soi: Some(Soi {
                base_url: Some(base_url.to_string()),
                callback: Some(SoiCallback {
                    method: Some(method.to_string()),
                    path: Some(path.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_grouping_is_case_insensitive_on_method_and_url() {
        let items = vec![
            routed_item("i1", "http://s/", "POST", "/cb"),
            routed_item("i2", "http://S", "post", "cb"),
        ];
        let buckets = group_by_destination(items);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].items.len(), 2);
    }

    #[test]
    fn test_distinct_destinations_get_distinct_buckets() {
        let items = vec![
            routed_item("i1", "http://a/", "POST", "/cb"),
            routed_item("i2", "http://b/", "POST", "/cb"),
            routed_item("i3", "http://a/", "PUT", "/cb"),
        ];
        let buckets = group_by_destination(items);
        assert_eq!(buckets.len(), 3);
    }

    #[test]
    fn test_items_without_complete_callback_are_skipped() {
        let mut no_path = routed_item("i2", "http://s/", "POST", "/cb");
        no_path.soi.as_mut().unwrap().callback.as_mut().unwrap().path = None;
        let items = vec![
            routed_item("i1", "http://s/", "POST", "/cb"),
            no_path,
            Intelligence {
                global_id: "i3".to_string(),
                ..Default::default()
            },
        ];
        let buckets = group_by_destination(items);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].items.len(), 1);
        assert_eq!(buckets[0].items[0].global_id, "i1");
    }

    struct RecordingControlPlane {
        updates: Mutex<Vec<Vec<Intelligence>>>,
    }

    #[async_trait]
    impl ControlPlane for RecordingControlPlane {
        async fn fetch_producer_config(
            &self,
            _config: &ResolvedConfig,
            _kind: &str,
        ) -> Result<crate::types::ProducerConfig, ProducerError> {
            unreachable!("not used by the dispatcher")
        }

        async fn fetch_intelligences(
            &self,
            _config: &ResolvedConfig,
        ) -> Result<Vec<Intelligence>, ProducerError> {
            unreachable!("not used by the dispatcher")
        }

        async fn update_intelligences(
            &self,
            _config: &ResolvedConfig,
            items: &[Intelligence],
        ) -> Result<(), ProducerError> {
            self.updates.lock().unwrap().push(items.to_vec());
            Ok(())
        }
    }

    struct FlakyTargetSystem {
        fail: AtomicBool,
        deliveries: Mutex<Vec<Vec<Intelligence>>>,
    }

    #[async_trait]
    impl TargetSystem for FlakyTargetSystem {
        async fn deliver(
            &self,
            _soi: &Soi,
            items: &[Intelligence],
        ) -> Result<(), ProducerError> {
            self.deliveries.lock().unwrap().push(items.to_vec());
            if self.fail.load(Ordering::SeqCst) {
                Err(ProducerError::from_status(502, "bad gateway"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_each_bucket_delivers_only_its_own_items() {
        let control: Arc<dyn ControlPlane> = Arc::new(RecordingControlPlane {
            updates: Mutex::new(Vec::new()),
        });
        let target = Arc::new(FlakyTargetSystem {
            fail: AtomicBool::new(false),
            deliveries: Mutex::new(Vec::new()),
        });
        let target_dyn: Arc<dyn TargetSystem> = target.clone();

        let items = vec![
            routed_item("i1", "http://a/", "POST", "/cb"),
            routed_item("i2", "http://b/", "POST", "/cb"),
        ];
        dispatch_results(&control, &target_dyn, &ResolvedConfig::default(), items).await;

        let deliveries = target.deliveries.lock().unwrap();
        assert_eq!(deliveries.len(), 2);
        assert!(deliveries.iter().all(|batch| batch.len() == 1));
    }

    #[tokio::test]
    async fn test_soi_failure_rewrites_items_before_upstream_report() {
        let control = Arc::new(RecordingControlPlane {
            updates: Mutex::new(Vec::new()),
        });
        let control_dyn: Arc<dyn ControlPlane> = control.clone();
        let target_dyn: Arc<dyn TargetSystem> = Arc::new(FlakyTargetSystem {
            fail: AtomicBool::new(true),
            deliveries: Mutex::new(Vec::new()),
        });

        let mut item = routed_item("i1", "http://a/", "POST", "/cb");
        item.set_state(IntelligenceState::Finished, None);
        dispatch_results(
            &control_dyn,
            &target_dyn,
            &ResolvedConfig::default(),
            vec![item],
        )
        .await;

        let updates = control.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0][0].state(), Some("FAILED"));
        let reason = updates[0][0].system.failures_reason.as_deref().unwrap();
        assert!(reason.contains("502") || reason.contains("ServerError"));
    }
}
