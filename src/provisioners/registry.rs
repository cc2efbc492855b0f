//! Provisioner registry
//!
//! Filled once at startup and shared read-only afterwards.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::SecretProvisioner;

/// Maps secret types to the provisioner that handles them.
#[derive(Default)]
pub struct ProvisionerRegistry {
    provisioners: HashMap<String, Arc<dyn SecretProvisioner>>,
}

impl std::fmt::Debug for ProvisionerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionerRegistry")
            .field("types", &self.registered_types())
            .finish()
    }
}

impl ProvisionerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provisioner under its secret type.
    ///
    /// A later registration for the same type replaces the earlier one.
    pub fn register(&mut self, provisioner: Arc<dyn SecretProvisioner>) {
        let secret_type = provisioner.secret_type().to_string();
        info!(
            secret_type = %secret_type,
            supports_deletion = provisioner.supports_deletion(),
            "Registering provisioner"
        );
        if self.provisioners.insert(secret_type.clone(), provisioner).is_some() {
            warn!(secret_type = %secret_type, "Replaced previously registered provisioner");
        }
    }

    /// Builder-style [`ProvisionerRegistry::register`].
    pub fn with(mut self, provisioner: Arc<dyn SecretProvisioner>) -> Self {
        self.register(provisioner);
        self
    }

    pub fn get(&self, secret_type: &str) -> Option<Arc<dyn SecretProvisioner>> {
        self.provisioners.get(secret_type).cloned()
    }

    pub fn has_type(&self, secret_type: &str) -> bool {
        self.provisioners.contains_key(secret_type)
    }

    /// Registered types, sorted
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.provisioners.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.provisioners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.provisioners.is_empty()
    }
}
