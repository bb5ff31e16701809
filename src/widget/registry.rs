use log::info;
use std::collections::BTreeMap;
use std::sync::{ Arc, PoisonError, RwLock };
use thiserror::Error;

use super::ChatWidget;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a widget named '{0}' is already registered")]
    Duplicate(String),
}

/// Named widget instances living side by side, looked up explicitly instead of
/// through process-wide globals.
#[derive(Default)]
pub struct WidgetRegistry {
    widgets: RwLock<BTreeMap<String, Arc<ChatWidget>>>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, widget: ChatWidget) -> Result<Arc<ChatWidget>, RegistryError> {
        let mut widgets = self.widgets.write().unwrap_or_else(PoisonError::into_inner);
        let name = widget.name().to_string();
        if widgets.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        let widget = Arc::new(widget);
        widgets.insert(name.clone(), Arc::clone(&widget));
        info!("Registered widget '{}'", name);
        Ok(widget)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ChatWidget>> {
        self.widgets.read().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<ChatWidget>> {
        self.widgets.write().unwrap_or_else(PoisonError::into_inner).remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.widgets.read().unwrap_or_else(PoisonError::into_inner).keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.widgets.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
