//! Derived events consumed by the category context.

use catalog_core::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::product::{CategoryId, ProductId};
use crate::topics;

/// Direction of a category product-count adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentDirection {
    /// One more product in the category.
    Increment,
    /// One less product in the category.
    Decrement,
}

impl AdjustmentDirection {
    /// Returns the stable lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Increment => "increment",
            Self::Decrement => "decrement",
        }
    }

    /// Returns the topic adjustments in this direction are published on.
    #[must_use]
    pub fn topic(self) -> &'static str {
        match self {
            Self::Increment => topics::CATEGORY_PRODUCT_COUNT_INCREMENT,
            Self::Decrement => topics::CATEGORY_PRODUCT_COUNT_DECREMENT,
        }
    }
}

/// Request to adjust the product count of one category by one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCountAdjustment {
    /// Category whose count changes.
    pub category_id: CategoryId,
    /// Product that caused the change.
    pub product_id: ProductId,
    /// Whether the count goes up or down.
    pub direction: AdjustmentDirection,
    /// Product name, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    /// When the adjustment was derived.
    pub timestamp: DateTime<Utc>,
}

impl CategoryCountAdjustment {
    /// Builds an increment for `category_id`.
    #[must_use]
    pub fn increment(
        category_id: CategoryId,
        product_id: ProductId,
        product_name: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            category_id,
            product_id,
            direction: AdjustmentDirection::Increment,
            product_name,
            timestamp,
        }
    }

    /// Builds a decrement for `category_id`.
    #[must_use]
    pub fn decrement(
        category_id: CategoryId,
        product_id: ProductId,
        product_name: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            category_id,
            product_id,
            direction: AdjustmentDirection::Decrement,
            product_name,
            timestamp,
        }
    }

    /// Returns the topic this adjustment is published on.
    #[must_use]
    pub fn topic(&self) -> &'static str {
        self.direction.topic()
    }

    /// Returns the partition key; adjustments of one category stay ordered.
    #[must_use]
    pub fn partition_key(&self) -> String {
        self.category_id.as_str().to_owned()
    }

    /// Serializes the adjustment into its JSON wire form.
    pub fn to_payload(&self) -> AppResult<String> {
        serde_json::to_string(self).map_err(|error| {
            AppError::Internal(format!(
                "failed to serialize category count adjustment: {error}"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::{AdjustmentDirection, CategoryCountAdjustment};
    use crate::product::{CategoryId, ProductId};
    use crate::topics;

    #[test]
    fn decrement_routes_to_decrement_topic() {
        let adjustment = CategoryCountAdjustment::decrement(
            CategoryId::new("garden").unwrap_or_else(|_| unreachable!()),
            ProductId::new(),
            None,
            Utc::now(),
        );

        assert_eq!(adjustment.topic(), topics::CATEGORY_PRODUCT_COUNT_DECREMENT);
        assert_eq!(adjustment.partition_key(), "garden");
        assert_eq!(AdjustmentDirection::Decrement.as_str(), "decrement");
    }

    #[test]
    fn payload_uses_camel_case_and_omits_missing_name() {
        let adjustment = CategoryCountAdjustment::increment(
            CategoryId::new("garden").unwrap_or_else(|_| unreachable!()),
            ProductId::new(),
            None,
            Utc::now(),
        );

        let value: serde_json::Value = adjustment
            .to_payload()
            .ok()
            .and_then(|payload| serde_json::from_str(&payload).ok())
            .unwrap_or_default();
        assert_eq!(value["categoryId"], json!("garden"));
        assert_eq!(value["direction"], json!("increment"));
        assert!(value.get("productName").is_none());
    }
}
