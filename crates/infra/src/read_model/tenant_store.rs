use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use stockor_core::TenantId;

/// Tenant-isolated key/value store for disposable read models.
pub trait TenantStore<K, V>: Send + Sync {
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V>;
    fn upsert(&self, tenant_id: TenantId, key: K, value: V);
    fn list(&self, tenant_id: TenantId) -> Vec<V>;
    fn clear_tenant(&self, tenant_id: TenantId);

    /// First record of a tenant matching `predicate`.
    fn find(&self, tenant_id: TenantId, predicate: &dyn Fn(&V) -> bool) -> Option<V> {
        self.list(tenant_id).into_iter().find(|v| predicate(v))
    }
}

impl<K, V, S> TenantStore<K, V> for Arc<S>
where
    S: TenantStore<K, V> + ?Sized,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        (**self).get(tenant_id, key)
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        (**self).upsert(tenant_id, key, value)
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        (**self).list(tenant_id)
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        (**self).clear_tenant(tenant_id)
    }

    fn find(&self, tenant_id: TenantId, predicate: &dyn Fn(&V) -> bool) -> Option<V> {
        (**self).find(tenant_id, predicate)
    }
}

#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    inner: RwLock<HashMap<(TenantId, K), V>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Clone + Eq + Hash + Ord + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&(tenant_id, key.clone())).cloned()
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        match self.inner.write() {
            Ok(mut map) => {
                map.insert((tenant_id, key), value);
            }
            Err(_) => tracing::warn!(%tenant_id, "read model lock poisoned; upsert dropped"),
        }
    }

    /// Records ordered by key, so listings are stable.
    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        let Ok(map) = self.inner.read() else {
            return vec![];
        };
        let mut rows: Vec<(&K, &V)> = map
            .iter()
            .filter(|((t, _), _)| *t == tenant_id)
            .map(|((_, k), v)| (k, v))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(b.0));
        rows.into_iter().map(|(_, v)| v.clone()).collect()
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(t, _k), _v| *t != tenant_id);
        }
    }
}
