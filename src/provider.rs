//! Virtual providers and the registry that maps node types to them.
//!
//! A provider owns the synthesis of one node type's content. Providers are registered through a
//! [`ProviderRegistryBuilder`] during startup, which initializes them against the shared
//! [`NameResolver`], and are then frozen into an immutable [`ProviderRegistry`].

use std::{collections::HashMap, sync::Arc};

use crate::{
    context::ProviderContext,
    error::RepositoryError,
    names::{Name, NameResolver},
    properties::NodeState,
    view::{ProviderId, ViewId},
};

pub trait VirtualProvider: Send + Sync {
    /// Name identifying the implementation, shared by all registrations of one provider type.
    fn module_name(&self) -> &'static str;

    /// Resolve (and possibly define) the names the provider depends on. Called once per
    /// registration, with the id of the type the provider is registered against.
    fn initialize(&mut self, resolver: &NameResolver, id: ProviderId) -> Result<(), RepositoryError>;

    /// Virtualize a state of the registered type. Returning the state unmodified is always valid.
    fn populate(
        &self,
        ctx: &mut ProviderContext,
        state: NodeState,
    ) -> Result<NodeState, RepositoryError>;

    /// Build the state of a view node this provider minted.
    fn populate_view(
        &self,
        ctx: &mut ProviderContext,
        view: ViewId,
    ) -> Result<NodeState, RepositoryError>;
}

pub struct ProviderRegistryBuilder {
    resolver: NameResolver,
    providers: HashMap<Name, Box<dyn VirtualProvider>>,
}

impl ProviderRegistryBuilder {
    pub fn new(resolver: NameResolver) -> Self {
        ProviderRegistryBuilder {
            resolver,
            providers: HashMap::new(),
        }
    }

    /// Register `provider` against `type_name`. A later registration for the same type replaces
    /// the earlier one.
    pub fn register(
        mut self,
        type_name: &str,
        mut provider: Box<dyn VirtualProvider>,
    ) -> Result<Self, RepositoryError> {
        let name = self.resolver.resolve(type_name)?;
        provider.initialize(&self.resolver, ProviderId(name))?;
        if let Some(previous) = self.providers.insert(name, provider) {
            tracing::info!(
                "[ProviderRegistryBuilder::register] {type_name}: replacing provider {}",
                previous.module_name()
            );
        } else {
            tracing::debug!("[ProviderRegistryBuilder::register] registered {type_name}");
        }
        Ok(self)
    }

    pub fn build(self) -> Arc<ProviderRegistry> {
        let mut modules: HashMap<&'static str, Name> = HashMap::new();
        let mut providers = HashMap::new();
        for (name, provider) in self.providers {
            let provider: Arc<dyn VirtualProvider> = Arc::from(provider);
            // Lowest type name wins, so the module index does not depend on hash order
            let entry = modules.entry(provider.module_name()).or_insert(name);
            if name < *entry {
                *entry = name;
            }
            providers.insert(name, provider);
        }
        let modules = modules
            .into_iter()
            .filter_map(|(module, name)| providers.get(&name).map(|p| (module, p.clone())))
            .collect();
        Arc::new(ProviderRegistry {
            resolver: self.resolver,
            providers,
            modules,
        })
    }
}

/// Immutable type → provider mapping, shared across sessions.
pub struct ProviderRegistry {
    resolver: NameResolver,
    providers: HashMap<Name, Arc<dyn VirtualProvider>>,
    modules: HashMap<&'static str, Arc<dyn VirtualProvider>>,
}

impl ProviderRegistry {
    pub fn resolver(&self) -> &NameResolver {
        &self.resolver
    }

    pub fn lookup(&self, type_name: &Name) -> Option<Arc<dyn VirtualProvider>> {
        self.providers.get(type_name).cloned()
    }

    pub fn lookup_name(&self, qualified: &str) -> Option<Arc<dyn VirtualProvider>> {
        self.resolver
            .lookup(qualified)
            .and_then(|name| self.lookup(&name))
    }

    pub fn lookup_module(&self, module: &str) -> Option<Arc<dyn VirtualProvider>> {
        self.modules.get(module).cloned()
    }

    pub fn by_id(&self, id: ProviderId) -> Option<Arc<dyn VirtualProvider>> {
        self.lookup(&id.0)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
