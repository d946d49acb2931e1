//! Typed MBean access with a validated bean/field catalog.
//!
//! The catalog (`listMBeans` plus `listGetters` for each bean) is loaded
//! lazily on first use and then answers existence checks without a remote
//! call. Every lookup names an explicit `(bean, field)` pair; pairs the
//! component never announced fail with [`BeanError::UnknownBeanField`].

use super::error::BeanError;
use super::rpc::{MBeanRpc, RpcError};
use crate::value::{unfix_value, BeanValue};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Bean names and the fields each bean exposes.
#[derive(Debug, Default, Clone)]
pub struct BeanCatalog {
    beans: Vec<String>,
    fields: HashMap<String, Vec<String>>,
    lookup: HashMap<String, HashSet<String>>,
}

impl BeanCatalog {
    pub fn insert(&mut self, bean: impl Into<String>, mut fields: Vec<String>) {
        let bean = bean.into();
        fields.sort();
        if !self.fields.contains_key(&bean) {
            self.beans.push(bean.clone());
            self.beans.sort();
        }
        self.lookup
            .insert(bean.clone(), fields.iter().cloned().collect());
        self.fields.insert(bean, fields);
    }

    /// Bean names in sorted order.
    pub fn beans(&self) -> &[String] {
        &self.beans
    }

    pub fn fields(&self, bean: &str) -> Option<&[String]> {
        self.fields.get(bean).map(Vec::as_slice)
    }

    pub fn contains_bean(&self, bean: &str) -> bool {
        self.lookup.contains_key(bean)
    }

    pub fn contains(&self, bean: &str, field: &str) -> bool {
        self.lookup
            .get(bean)
            .is_some_and(|fields| fields.contains(field))
    }
}

/// MBean client for one component.
pub struct MBeanClient {
    component: String,
    rpc: Arc<dyn MBeanRpc>,
    catalog: Mutex<Option<Arc<BeanCatalog>>>,
}

impl MBeanClient {
    pub fn new(component: impl Into<String>, rpc: Arc<dyn MBeanRpc>) -> Self {
        Self {
            component: component.into(),
            rpc,
            catalog: Mutex::new(None),
        }
    }

    /// Returns the catalog, loading it if this is the first request.
    pub fn catalog(&self) -> Result<Arc<BeanCatalog>, BeanError> {
        let mut guard = self.catalog.lock();
        if let Some(catalog) = guard.as_ref() {
            return Ok(Arc::clone(catalog));
        }
        let catalog = Arc::new(self.load()?);
        *guard = Some(Arc::clone(&catalog));
        Ok(catalog)
    }

    /// Drops the cached catalog and fetches it again.
    pub fn reload_bean_info(&self) -> Result<(), BeanError> {
        let catalog = Arc::new(self.load()?);
        *self.catalog.lock() = Some(catalog);
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.catalog.lock().is_some()
    }

    fn load(&self) -> Result<BeanCatalog, BeanError> {
        let beans = self
            .rpc
            .list_mbeans()
            .map_err(|e| self.rpc_error(e, "listing MBeans"))?;

        let mut catalog = BeanCatalog::default();
        let mut failed = Vec::new();
        for bean in beans {
            match self.rpc.list_getters(&bean) {
                Ok(fields) => catalog.insert(bean, fields),
                Err(e) => {
                    tracing::debug!(
                        component = %self.component,
                        bean = %bean,
                        error = %e,
                        "Cannot list MBean getters"
                    );
                    failed.push(bean);
                }
            }
        }

        if !failed.is_empty() {
            return Err(BeanError::Load {
                component: self.component.clone(),
                failed,
            });
        }
        Ok(catalog)
    }

    fn rpc_error(&self, err: RpcError, action: &str) -> BeanError {
        if err.is_unreachable() {
            BeanError::Timeout {
                component: self.component.clone(),
                action: action.to_string(),
            }
        } else {
            BeanError::Rpc {
                component: self.component.clone(),
                source: err,
            }
        }
    }

    fn check_bean(&self, catalog: &BeanCatalog, bean: &str) -> Result<(), BeanError> {
        if catalog.contains_bean(bean) {
            Ok(())
        } else {
            Err(BeanError::UnknownBean {
                component: self.component.clone(),
                bean: bean.to_string(),
            })
        }
    }

    fn check_field(&self, catalog: &BeanCatalog, bean: &str, field: &str) -> Result<(), BeanError> {
        self.check_bean(catalog, bean)?;
        if catalog.contains(bean, field) {
            Ok(())
        } else {
            Err(BeanError::UnknownBeanField {
                component: self.component.clone(),
                bean: bean.to_string(),
                field: field.to_string(),
            })
        }
    }

    pub fn bean_names(&self) -> Result<Vec<String>, BeanError> {
        Ok(self.catalog()?.beans().to_vec())
    }

    pub fn bean_fields(&self, bean: &str) -> Result<Vec<String>, BeanError> {
        let catalog = self.catalog()?;
        self.check_bean(&catalog, bean)?;
        Ok(catalog.fields(bean).map(<[String]>::to_vec).unwrap_or_default())
    }

    /// Reads one field, converting decorated numeric strings.
    pub fn get(&self, bean: &str, field: &str) -> Result<BeanValue, BeanError> {
        let catalog = self.catalog()?;
        self.check_field(&catalog, bean, field)?;
        let value = self
            .rpc
            .get(bean, field)
            .map_err(|e| self.rpc_error(e, &format!("getting {}.{}", bean, field)))?;
        Ok(unfix_value(value))
    }

    /// Reads several fields of one bean in a single call.
    pub fn get_attributes(
        &self,
        bean: &str,
        fields: &[String],
    ) -> Result<BTreeMap<String, BeanValue>, BeanError> {
        let catalog = self.catalog()?;
        for field in fields {
            self.check_field(&catalog, bean, field)?;
        }
        let values = self
            .rpc
            .get_attributes(bean, fields)
            .map_err(|e| self.rpc_error(e, &format!("getting {} attributes", bean)))?;
        Ok(values
            .into_iter()
            .map(|(k, v)| (k, unfix_value(v)))
            .collect())
    }

    /// Reads every field of `bean`.
    pub fn get_bean(&self, bean: &str) -> Result<BTreeMap<String, BeanValue>, BeanError> {
        let fields = self.bean_fields(bean)?;
        self.get_attributes(bean, &fields)
    }
}

impl std::fmt::Debug for MBeanClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MBeanClient")
            .field("component", &self.component)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::rpc::RpcResult;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeBeans {
        list_calls: AtomicUsize,
        broken_bean: Option<&'static str>,
    }

    impl FakeBeans {
        fn new() -> Self {
            Self {
                list_calls: AtomicUsize::new(0),
                broken_bean: None,
            }
        }
    }

    impl MBeanRpc for FakeBeans {
        fn list_mbeans(&self) -> RpcResult<Vec<String>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["backEnd".into(), "jvm".into()])
        }

        fn list_getters(&self, bean: &str) -> RpcResult<Vec<String>> {
            if Some(bean) == self.broken_bean {
                return Err(RpcError::timeout("listGetters"));
            }
            match bean {
                "backEnd" => Ok(vec!["NumEventsSent".into(), "DiskAvailable".into()]),
                _ => Ok(vec!["MemoryStatus".into()]),
            }
        }

        fn get(&self, _bean: &str, field: &str) -> RpcResult<BeanValue> {
            match field {
                "NumEventsSent" => Ok(BeanValue::from("12345L")),
                _ => Ok(BeanValue::Int(1)),
            }
        }

        fn get_attributes(
            &self,
            bean: &str,
            fields: &[String],
        ) -> RpcResult<BTreeMap<String, BeanValue>> {
            fields
                .iter()
                .map(|f| self.get(bean, f).map(|v| (f.clone(), v)))
                .collect()
        }
    }

    #[test]
    fn test_catalog_loads_once() {
        let rpc = Arc::new(FakeBeans::new());
        let client = MBeanClient::new("eventBuilder", rpc.clone());
        assert!(!client.is_loaded());
        assert_eq!(client.bean_names().unwrap(), vec!["backEnd", "jvm"]);
        client.get("backEnd", "DiskAvailable").unwrap();
        assert_eq!(rpc.list_calls.load(Ordering::SeqCst), 1);

        client.reload_bean_info().unwrap();
        assert_eq!(rpc.list_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_get_unfixes_values() {
        let client = MBeanClient::new("eventBuilder", Arc::new(FakeBeans::new()));
        assert_eq!(client.get("backEnd", "NumEventsSent").unwrap(), BeanValue::Int(12345));

        let attrs = client
            .get_attributes("backEnd", &["NumEventsSent".to_string()])
            .unwrap();
        assert_eq!(attrs["NumEventsSent"], BeanValue::Int(12345));
    }

    #[test]
    fn test_unknown_pairs_are_rejected() {
        let client = MBeanClient::new("eventBuilder", Arc::new(FakeBeans::new()));
        assert!(matches!(
            client.get("frontEnd", "X"),
            Err(BeanError::UnknownBean { .. })
        ));
        assert!(matches!(
            client.get("backEnd", "Bogus"),
            Err(BeanError::UnknownBeanField { .. })
        ));
    }

    #[test]
    fn test_failed_beans_are_reported() {
        let mut rpc = FakeBeans::new();
        rpc.broken_bean = Some("jvm");
        let client = MBeanClient::new("eventBuilder", Arc::new(rpc));
        match client.bean_names() {
            Err(BeanError::Load { failed, .. }) => assert_eq!(failed, vec!["jvm"]),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!client.is_loaded());
    }
}
