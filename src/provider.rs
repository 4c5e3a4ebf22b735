//! Provider entry points
//!
//! Host-facing callbacks: validate raw configuration, route to the lifecycle
//! controller of the resource kind, and convert results into state entries.
//! Every error leaves here tagged with the resource address and operation.

use crate::error::{Operation, OperationError, ProviderError};
use crate::nsx::LoadBalancerApi;
use crate::resource::{
    get_resource, get_schema, validate, L4MonitorConfig, LbL4MonitorController, RawConfig,
    ResourceAddress, ResourceSchema, StateEntry,
};

/// Resource provider bound to one NSX API handle
#[derive(Clone)]
pub struct Provider<A> {
    api: A,
}

impl<A: LoadBalancerApi + Clone> Provider<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Attribute schema the host validates blocks of `kind` against
    pub fn schema(kind: &str) -> Option<&'static ResourceSchema> {
        get_schema(kind)
    }

    fn controller(&self, kind: &str) -> Result<LbL4MonitorController<A>, ProviderError> {
        let resource = get_resource(kind).ok_or_else(|| {
            ProviderError::validation("type", format!("unknown resource type {}", kind))
        })?;
        Ok(LbL4MonitorController::new(self.api.clone(), resource.protocol))
    }

    /// Type-check configuration; no request is sent
    pub fn validate(
        &self,
        address: &ResourceAddress,
        raw: &RawConfig,
    ) -> Result<L4MonitorConfig, OperationError> {
        let wrap = |e| OperationError::new(address.to_string(), Operation::Validate, e);

        let schema = Self::schema(&address.kind).ok_or_else(|| {
            wrap(ProviderError::validation(
                "type",
                format!("unknown resource type {}", address.kind),
            ))
        })?;
        let validated = validate(schema, raw).map_err(wrap)?;
        L4MonitorConfig::from_validated(&validated).map_err(wrap)
    }

    pub async fn create(
        &self,
        address: &ResourceAddress,
        raw: &RawConfig,
    ) -> Result<StateEntry, OperationError> {
        let config = self.validate(address, raw)?;
        let wrap = |e| OperationError::new(address.to_string(), Operation::Create, e);

        let controller = self.controller(&address.kind).map_err(wrap)?;
        let state = controller.create(&config).await.map_err(wrap)?;
        Ok(StateEntry::from_monitor(&state))
    }

    /// Refresh an entry; `None` means the object is gone and the entry should be pruned
    pub async fn read(
        &self,
        address: &ResourceAddress,
        entry: &StateEntry,
    ) -> Result<Option<StateEntry>, OperationError> {
        let wrap = |e| OperationError::new(address.to_string(), Operation::Read, e);

        let controller = self.controller(&entry.kind).map_err(wrap)?;
        match controller.read(&entry.id).await {
            Ok(state) => Ok(Some(StateEntry::from_monitor(&state))),
            Err(e) if e.is_not_found() => {
                tracing::warn!("{} ({}) no longer exists, removing from state", address, entry.id);
                Ok(None)
            }
            Err(e) => Err(wrap(e)),
        }
    }

    /// Whether `raw` differs from what `entry` recorded
    pub fn needs_update(
        &self,
        address: &ResourceAddress,
        entry: &StateEntry,
        raw: &RawConfig,
    ) -> Result<bool, OperationError> {
        let config = self.validate(address, raw)?;
        let state = entry
            .to_monitor_state()
            .map_err(|e| OperationError::new(address.to_string(), Operation::Read, e))?;
        Ok(!state.matches(&config))
    }

    pub async fn update(
        &self,
        address: &ResourceAddress,
        entry: &StateEntry,
        raw: &RawConfig,
    ) -> Result<StateEntry, OperationError> {
        let config = self.validate(address, raw)?;
        let wrap = |e| OperationError::new(address.to_string(), Operation::Update, e);

        let current = entry.to_monitor_state().map_err(wrap)?;
        let controller = self.controller(&entry.kind).map_err(wrap)?;
        let state = controller
            .update(&entry.id, current.revision, &config)
            .await
            .map_err(wrap)?;
        Ok(StateEntry::from_monitor(&state))
    }

    pub async fn delete(
        &self,
        address: &ResourceAddress,
        entry: &StateEntry,
    ) -> Result<(), OperationError> {
        let wrap = |e| OperationError::new(address.to_string(), Operation::Delete, e);

        let controller = self.controller(&entry.kind).map_err(wrap)?;
        controller.delete(&entry.id).await.map_err(wrap)
    }

    pub async fn exists(&self, kind: &str, id: &str) -> Result<bool, OperationError> {
        let wrap = |e| OperationError::new(format!("{}[{}]", kind, id), Operation::Exists, e);

        let controller = self.controller(kind).map_err(wrap)?;
        controller.exists(id).await.map_err(wrap)
    }

    /// Build a state entry for an existing object from its id alone
    pub async fn import(
        &self,
        address: &ResourceAddress,
        id: &str,
    ) -> Result<StateEntry, OperationError> {
        let wrap = |e| OperationError::new(address.to_string(), Operation::Import, e);

        let controller = self.controller(&address.kind).map_err(wrap)?;
        let state = controller.import(id).await.map_err(wrap)?;
        Ok(StateEntry::from_monitor(&state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nsx::memory::InMemoryNsx;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawConfig {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_any_request() {
        let nsx = InMemoryNsx::new();
        nsx.set_offline(true);
        let provider = Provider::new(nsx);
        let address = ResourceAddress::new("nsxt_lb_tcp_monitor", "test");

        let err = provider
            .create(&address, &raw(json!({"fall_count": "zero"})))
            .await
            .unwrap_err();
        assert_eq!(err.operation, Operation::Validate);
        assert!(matches!(err.source, ProviderError::Validation(_)));
    }

    #[tokio::test]
    async fn test_read_prunes_deleted_objects() {
        let nsx = InMemoryNsx::new();
        let provider = Provider::new(nsx.clone());
        let address = ResourceAddress::new("nsxt_lb_udp_monitor", "dns");

        let entry = provider
            .create(&address, &raw(json!({"display_name": "dns", "monitor_port": 53})))
            .await
            .unwrap();
        nsx.remove(&entry.id).await;

        assert_eq!(provider.read(&address, &entry).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_errors_carry_address_and_operation() {
        let nsx = InMemoryNsx::new();
        let provider = Provider::new(nsx.clone());
        let address = ResourceAddress::new("nsxt_lb_tcp_monitor", "web");

        let entry = provider.create(&address, &RawConfig::new()).await.unwrap();
        nsx.set_offline(true);

        let err = provider.delete(&address, &entry).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "nsxt_lb_tcp_monitor.web: delete failed: network error: connection refused"
        );
    }

    #[tokio::test]
    async fn test_needs_update_ignores_unset_display_name() {
        let provider = Provider::new(InMemoryNsx::new());
        let address = ResourceAddress::new("nsxt_lb_tcp_monitor", "web");
        let config = raw(json!({"send": "ping", "receive": "pong"}));

        let entry = provider.create(&address, &config).await.unwrap();
        assert!(!provider.needs_update(&address, &entry, &config).unwrap());

        let changed = raw(json!({"send": "ping", "receive": "pong", "timeout": "20"}));
        assert!(provider.needs_update(&address, &entry, &changed).unwrap());
    }
}
