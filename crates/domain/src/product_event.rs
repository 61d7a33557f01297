//! Product lifecycle events published by the write path.

use catalog_core::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::product::{CategoryId, Product, ProductId};
use crate::topics;

/// Payload of a `product.created` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCreated {
    /// Created product.
    pub id: ProductId,
    /// When the product was created.
    pub timestamp: DateTime<Utc>,
    /// Product version after the change.
    pub version: i64,
    /// Product name.
    pub name: String,
    /// Product price.
    pub price: f64,
    /// Category the product was created in.
    pub category_id: CategoryId,
}

/// Payload of a `product.updated` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdated {
    /// Updated product.
    pub id: ProductId,
    /// When the product was updated.
    pub timestamp: DateTime<Utc>,
    /// Product version after the change.
    pub version: i64,
    /// Product name after the change.
    pub name: String,
    /// Product price after the change.
    pub price: f64,
    /// Category after the change.
    pub category_id: CategoryId,
    /// Category before the change, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_category_id: Option<CategoryId>,
}

impl ProductUpdated {
    /// Returns the `(from, to)` categories when this update moved the product.
    #[must_use]
    pub fn category_move(&self) -> Option<(&CategoryId, &CategoryId)> {
        self.old_category_id
            .as_ref()
            .filter(|old_category_id| **old_category_id != self.category_id)
            .map(|old_category_id| (old_category_id, &self.category_id))
    }
}

/// Payload of a `product.deleted` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDeleted {
    /// Deleted product.
    pub id: ProductId,
    /// When the product was deleted.
    pub timestamp: DateTime<Utc>,
    /// Last version of the product.
    pub version: i64,
    /// Product name at deletion time.
    pub name: String,
    /// Product price at deletion time.
    pub price: f64,
    /// Category the product belonged to.
    pub category_id: CategoryId,
}

/// Domain event emitted after a product mutation, tagged by `event_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum ProductEvent {
    /// A product was created.
    #[serde(rename = "CREATED")]
    Created(ProductCreated),
    /// A product was updated.
    #[serde(rename = "UPDATED")]
    Updated(ProductUpdated),
    /// A product was deleted.
    #[serde(rename = "DELETED")]
    Deleted(ProductDeleted),
}

impl ProductEvent {
    /// Builds the creation event for a freshly stored product.
    #[must_use]
    pub fn created(product: &Product) -> Self {
        Self::Created(ProductCreated {
            id: product.id,
            timestamp: product.created_at,
            version: product.version,
            name: product.name.clone(),
            price: product.price,
            category_id: product.category_id.clone(),
        })
    }

    /// Builds the update event, remembering the category held before the change.
    #[must_use]
    pub fn updated(product: &Product, old_category_id: Option<CategoryId>) -> Self {
        Self::Updated(ProductUpdated {
            id: product.id,
            timestamp: product.updated_at,
            version: product.version,
            name: product.name.clone(),
            price: product.price,
            category_id: product.category_id.clone(),
            old_category_id,
        })
    }

    /// Builds the deletion event for a removed product.
    #[must_use]
    pub fn deleted(product: &Product, timestamp: DateTime<Utc>) -> Self {
        Self::Deleted(ProductDeleted {
            id: product.id,
            timestamp,
            version: product.version,
            name: product.name.clone(),
            price: product.price,
            category_id: product.category_id.clone(),
        })
    }

    /// Returns the topic this event is published on.
    #[must_use]
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Created(_) => topics::PRODUCT_CREATED,
            Self::Updated(_) => topics::PRODUCT_UPDATED,
            Self::Deleted(_) => topics::PRODUCT_DELETED,
        }
    }

    /// Returns the product the event is about.
    #[must_use]
    pub fn product_id(&self) -> ProductId {
        match self {
            Self::Created(event) => event.id,
            Self::Updated(event) => event.id,
            Self::Deleted(event) => event.id,
        }
    }

    /// Returns the partition key, which keeps one product's events in order.
    #[must_use]
    pub fn partition_key(&self) -> String {
        self.product_id().to_string()
    }

    /// Serializes the event into its JSON wire form.
    pub fn to_payload(&self) -> AppResult<String> {
        serde_json::to_string(self).map_err(|error| {
            AppError::Internal(format!("failed to serialize product event: {error}"))
        })
    }

    /// Decodes a payload received on `topic`.
    ///
    /// The payload must be valid JSON for one of the variants and its
    /// `event_type` must agree with the topic it arrived on.
    pub fn decode(topic: &str, payload: &str) -> AppResult<Self> {
        let event = serde_json::from_str::<Self>(payload).map_err(|error| {
            AppError::Validation(format!("malformed product event on '{topic}': {error}"))
        })?;

        if event.topic() != topic {
            return Err(AppError::Validation(format!(
                "product event of type '{}' arrived on topic '{topic}'",
                event.topic()
            )));
        }

        Ok(event)
    }
}
