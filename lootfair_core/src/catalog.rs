use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::selector::WeightedItem;

/// Read-only view of the case catalog. Items come back in the stable order
/// disclosed to players; the selector depends on that order.
#[async_trait]
pub trait ItemCatalog: Send + Sync {
    /// `None` when the case does not exist.
    async fn items_for_case(&self, case_id: &str) -> Result<Option<Vec<WeightedItem>>, StoreError>;
}

/// Fixed in-process catalog.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    cases: HashMap<String, Vec<WeightedItem>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_case(mut self, case_id: impl Into<String>, items: Vec<WeightedItem>) -> Self {
        self.cases.insert(case_id.into(), items);
        self
    }
}

#[async_trait]
impl ItemCatalog for StaticCatalog {
    async fn items_for_case(&self, case_id: &str) -> Result<Option<Vec<WeightedItem>>, StoreError> {
        Ok(self.cases.get(case_id).cloned())
    }
}
