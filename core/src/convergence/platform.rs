//! Platform convergence: drives one `MaasPlatform` towards its manifests.
//!
//! A pass fetches the platform, bootstraps the required namespaces, then
//! renders and applies each manifest group in order. The first failing group
//! aborts the pass; nothing applied earlier is rolled back, and the next pass
//! starts from scratch.

use tracing::{debug, info, instrument, warn};

use super::applier::{Applier, ApplyOptions, ApplySummary, Owner};
use super::artifacts::TIER_MAPPING_NAME;
use super::CancelToken;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::infrastructure::{get_optional, ObjectStore};
use crate::manifest::{ManifestGroup, ManifestStore};
use crate::render::{render, VariableResolver};
use crate::types::object::{DynamicObject, ObjectKey, ObjectRef};
use crate::types::platform::{MaasPlatform, MaasPlatformStatus, PlatformPhase};

/// Result of one platform pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The platform no longer exists; nothing was done.
    Deleted,
    Converged(ConvergeReport),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvergeReport {
    pub namespaces_created: u32,
    /// Applied groups in apply order.
    pub groups: Vec<(ManifestGroup, ApplySummary)>,
    /// Groups disabled by the platform's configuration.
    pub skipped_groups: Vec<ManifestGroup>,
}

impl ConvergeReport {
    pub fn total(&self) -> ApplySummary {
        let mut total = ApplySummary::default();
        for (_, summary) in &self.groups {
            total.merge(summary);
        }
        total
    }

    pub fn group(&self, group: ManifestGroup) -> Option<&ApplySummary> {
        self.groups.iter().find(|(g, _)| *g == group).map(|(_, s)| s)
    }
}

pub struct PlatformReconciler<'a> {
    store: &'a dyn ObjectStore,
    manifests: &'a dyn ManifestStore,
    config: &'a EngineConfig,
    cancel: Option<&'a CancelToken>,
}

impl<'a> PlatformReconciler<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        manifests: &'a dyn ManifestStore,
        config: &'a EngineConfig,
    ) -> Self {
        PlatformReconciler {
            store,
            manifests,
            config,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    #[instrument(skip(self), fields(platform = %key))]
    pub fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome, EngineError> {
        let object = match get_optional(self.store, &MaasPlatform::object_ref(key))? {
            Some(object) => object,
            None => {
                info!("platform not found, assuming deleted");
                return Ok(ReconcileOutcome::Deleted);
            }
        };
        let platform = MaasPlatform::from_object(&object)?;

        let report = match self.converge(&platform) {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "convergence failed");
                self.record_failure(&object, &platform, &e);
                return Err(e);
            }
        };

        let total = report.total();
        self.write_status(
            &object,
            MaasPlatformStatus {
                phase: PlatformPhase::Ready,
                observed_generation: platform.metadata.generation,
                applied_objects: total.converged(),
                message: None,
            },
        )?;
        info!(
            created = total.created,
            updated = total.updated,
            unchanged = total.unchanged,
            skipped = total.skipped,
            "platform converged"
        );
        Ok(ReconcileOutcome::Converged(report))
    }

    fn converge(&self, platform: &MaasPlatform) -> Result<ConvergeReport, EngineError> {
        let mut report = ConvergeReport {
            namespaces_created: self.ensure_namespaces()?,
            ..ConvergeReport::default()
        };

        let vars = VariableResolver::new(self.store, self.config)
            .for_platform(platform)
            .variables();
        let owner = Owner::from(platform);
        let applier = Applier::new(self.store).with_cancel(self.cancel);

        for group in ManifestGroup::ALL {
            if group == ManifestGroup::GatewayAuthPolicy && !platform.authentication_enabled() {
                info!(%group, "authentication disabled, skipping group");
                report.skipped_groups.push(group);
                continue;
            }

            let summary = self
                .manifests
                .load(group)
                .and_then(|template| {
                    let objects = render(&template, &vars);
                    debug!(%group, objects = objects.len(), "rendered");
                    applier.apply_all(objects, &owner, &self.options_for(group))
                })
                .map_err(|source| EngineError::Group {
                    group,
                    source: Box::new(source),
                })?;
            info!(%group, created = summary.created, updated = summary.updated, "group applied");
            report.groups.push((group, summary));
        }

        Ok(report)
    }

    fn options_for(&self, group: ManifestGroup) -> ApplyOptions {
        let options = ApplyOptions::new().immutable_kinds(self.config.immutable_kinds.iter().cloned());
        match group {
            // The mapping table is owned by tier aggregation.
            ManifestGroup::ApiResources => options.skip("ConfigMap", TIER_MAPPING_NAME),
            _ => options,
        }
    }

    /// Create each required namespace that does not exist yet.
    fn ensure_namespaces(&self) -> Result<u32, EngineError> {
        let mut created = 0;
        for namespace in &self.config.required_namespaces {
            let target = ObjectRef::new("v1", "Namespace", "", namespace.as_str());
            if get_optional(self.store, &target)?.is_some() {
                continue;
            }
            self.store
                .create(&DynamicObject::new(&target))
                .map_err(|source| EngineError::Apply { object: target.clone(), source })?;
            info!(%namespace, "created namespace");
            created += 1;
        }
        Ok(created)
    }

    fn write_status(&self, object: &DynamicObject, status: MaasPlatformStatus) -> Result<(), EngineError> {
        let value = serde_json::to_value(&status).map_err(|e| EngineError::Serialize {
            what: "platform status",
            message: e.to_string(),
        })?;
        let mut object = object.clone();
        object.set("status", value);
        self.store.update_status(&object)?;
        Ok(())
    }

    /// Best effort: the original error is what the caller sees.
    fn record_failure(&self, object: &DynamicObject, platform: &MaasPlatform, error: &EngineError) {
        let applied_objects = platform
            .status
            .as_ref()
            .map(|s| s.applied_objects)
            .unwrap_or_default();
        let status = MaasPlatformStatus {
            phase: PlatformPhase::Failed,
            observed_generation: platform.metadata.generation,
            applied_objects,
            message: Some(error.to_string()),
        };
        if let Err(e) = self.write_status(object, status) {
            warn!(error = %e, "failed to record failure status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convergence::artifacts::TIER_MAPPING_NAMESPACE;
    use crate::convergence::applier::{LABEL_MANAGED_BY, LABEL_PLATFORM_NAME};
    use crate::error::StoreError;
    use crate::infrastructure::memory::{MemoryStore, StoreOp};
    use crate::manifest::{EmbeddedManifests, StaticManifests};
    use serde_json::json;

    fn platform(auth_enabled: bool) -> DynamicObject {
        DynamicObject::from_value(json!({
            "apiVersion": "myapp.io.odh.maas/v1alpha1",
            "kind": "MaasPlatform",
            "metadata": {"name": "platform", "namespace": "maas-api"},
            "spec": {"policies": {"authentication": {"enabled": auth_enabled}}},
        }))
        .unwrap()
    }

    fn key() -> ObjectKey {
        ObjectKey::namespaced("maas-api", "platform")
    }

    fn config() -> EngineConfig {
        EngineConfig {
            cluster_domain: Some("apps.test.io".into()),
            ..EngineConfig::default()
        }
    }

    fn status_of(store: &MemoryStore) -> MaasPlatformStatus {
        let obj = store.peek(&MaasPlatform::object_ref(&key())).unwrap();
        serde_json::from_value(obj.get("status").unwrap().clone()).unwrap()
    }

    #[test]
    fn missing_platform_is_a_no_op() {
        let store = MemoryStore::new();
        let config = config();
        let outcome = PlatformReconciler::new(&store, &EmbeddedManifests, &config)
            .reconcile(&key())
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Deleted);
        assert!(store.writes().is_empty());
    }

    #[test]
    fn converges_all_groups_and_reports_ready() {
        let store = MemoryStore::with_objects([platform(true)]);
        let config = config();
        let outcome = PlatformReconciler::new(&store, &EmbeddedManifests, &config)
            .reconcile(&key())
            .unwrap();
        let report = match outcome {
            ReconcileOutcome::Converged(report) => report,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(report.namespaces_created, 2);
        assert_eq!(report.groups.len(), 3);
        assert!(report.skipped_groups.is_empty());
        assert_eq!(report.group(ManifestGroup::ApiResources).unwrap().skipped, 1);

        let status = status_of(&store);
        assert_eq!(status.phase, PlatformPhase::Ready);
        assert_eq!(status.observed_generation, Some(1));
        assert_eq!(status.applied_objects, report.total().converged());
        assert!(status.message.is_none());

        let mapping = ObjectRef::new("v1", "ConfigMap", TIER_MAPPING_NAMESPACE, TIER_MAPPING_NAME);
        assert!(store.peek(&mapping).is_none());

        let gateway = ObjectRef::new(
            "gateway.networking.k8s.io/v1",
            "Gateway",
            "openshift-ingress",
            "maas-default-gateway",
        );
        let gateway = store.peek(&gateway).unwrap();
        assert!(gateway.owner_references().is_empty());
        assert_eq!(gateway.labels()[LABEL_MANAGED_BY], "maas-operator");
        assert_eq!(gateway.labels()[LABEL_PLATFORM_NAME], "platform");
        let listeners = gateway.pointer(&["spec", "listeners"]).unwrap();
        assert_eq!(listeners[0]["hostname"], "maas.apps.test.io");

        let service = store
            .peek(&ObjectRef::new("v1", "Service", "maas-api", "maas-api"))
            .unwrap();
        assert_eq!(service.owner_references().len(), 1);
    }

    #[test]
    fn second_pass_writes_only_status_noop() {
        let store = MemoryStore::with_objects([platform(true)]);
        let config = config();
        let reconciler = PlatformReconciler::new(&store, &EmbeddedManifests, &config);
        reconciler.reconcile(&key()).unwrap();
        store.clear_calls();

        let outcome = reconciler.reconcile(&key()).unwrap();
        let report = match outcome {
            ReconcileOutcome::Converged(report) => report,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(report.total().writes(), 0);
        let writes: Vec<_> = store
            .writes()
            .into_iter()
            .filter(|c| c.op != StoreOp::UpdateStatus)
            .collect();
        assert!(writes.is_empty(), "unexpected writes {:?}", writes);
    }

    #[test]
    fn disabled_authentication_skips_auth_group() {
        let store = MemoryStore::with_objects([platform(false)]);
        let config = config();
        let outcome = PlatformReconciler::new(&store, &EmbeddedManifests, &config)
            .reconcile(&key())
            .unwrap();
        match outcome {
            ReconcileOutcome::Converged(report) => {
                assert_eq!(report.skipped_groups, vec![ManifestGroup::GatewayAuthPolicy]);
                assert_eq!(report.groups.len(), 2);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        let policy = ObjectRef::new("kuadrant.io/v1", "AuthPolicy", "openshift-ingress", "gateway-auth-policy");
        assert!(store.peek(&policy).is_none());
    }

    #[test]
    fn missing_group_aborts_later_groups_and_records_failure() {
        let store = MemoryStore::with_objects([platform(true)]);
        let config = config();
        let manifests = StaticManifests::new().with(
            ManifestGroup::ApiResources,
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: first\n  namespace: maas-api\n",
        );
        let err = PlatformReconciler::new(&store, &manifests, &config)
            .reconcile(&key())
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Group { group: ManifestGroup::Networking, .. }
        ));
        assert!(store
            .peek(&ObjectRef::new("v1", "ConfigMap", "maas-api", "first"))
            .is_some());
        let status = status_of(&store);
        assert_eq!(status.phase, PlatformPhase::Failed);
        assert!(status.message.unwrap().contains("networking"));
    }

    #[test]
    fn failure_status_write_error_does_not_mask_original() {
        let store = MemoryStore::with_objects([platform(true)]);
        store.fail_next(StoreOp::Create, "Gateway", StoreError::Backend("denied".into()));
        store.fail_next(StoreOp::UpdateStatus, "MaasPlatform", StoreError::Backend("down".into()));
        let config = config();
        let err = PlatformReconciler::new(&store, &EmbeddedManifests, &config)
            .reconcile(&key())
            .unwrap_err();
        assert!(err.to_string().contains("Gateway openshift-ingress/maas-default-gateway"));
    }

    #[test]
    fn existing_namespaces_are_left_alone() {
        let ns = |name: &str| {
            DynamicObject::from_value(json!({
                "apiVersion": "v1", "kind": "Namespace", "metadata": {"name": name}
            }))
            .unwrap()
        };
        let store = MemoryStore::with_objects([platform(true), ns("maas-api"), ns("kuadrant-system")]);
        let config = config();
        let outcome = PlatformReconciler::new(&store, &EmbeddedManifests, &config)
            .reconcile(&key())
            .unwrap();
        match outcome {
            ReconcileOutcome::Converged(report) => assert_eq!(report.namespaces_created, 0),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn cancelled_pass_fails() {
        let store = MemoryStore::with_objects([platform(true)]);
        let config = config();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = PlatformReconciler::new(&store, &EmbeddedManifests, &config)
            .with_cancel(&cancel)
            .reconcile(&key())
            .unwrap_err();
        match err {
            EngineError::Group { source, .. } => assert!(matches!(*source, EngineError::Cancelled)),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
