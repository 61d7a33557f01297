//! Product catalog entities and validation rules.

use std::fmt::{Display, Formatter};

use catalog_core::{AppError, AppResult, NonEmptyString};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum accepted product name length in characters.
pub const PRODUCT_NAME_MAX_LENGTH: usize = 200;

/// Unique identifier for a product record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(Uuid);

impl ProductId {
    /// Creates a new random product identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a product identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Parses a product identifier from its textual form.
    pub fn parse(value: &str) -> AppResult<Self> {
        Uuid::parse_str(value.trim())
            .map(Self)
            .map_err(|error| AppError::Validation(format!("invalid product id '{value}': {error}")))
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ProductId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ProductId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Identifier of a category owned by the category context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CategoryId(NonEmptyString);

impl CategoryId {
    /// Creates a validated category identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        NonEmptyString::new(value.trim())
            .map(Self)
            .map_err(|_| AppError::Validation("category id must not be empty".to_owned()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for CategoryId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CategoryId> for String {
    fn from(value: CategoryId) -> Self {
        value.0.into()
    }
}

impl Display for CategoryId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Validated product attributes supplied by a create or update.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDraft {
    name: String,
    description: Option<String>,
    price: f64,
    category_id: CategoryId,
}

impl ProductDraft {
    /// Validates raw product attributes.
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        price: f64,
        category_id: impl Into<String>,
    ) -> AppResult<Self> {
        let name = name.into().trim().to_owned();
        if name.is_empty() {
            return Err(AppError::Validation(
                "product name must not be empty".to_owned(),
            ));
        }

        if name.chars().count() > PRODUCT_NAME_MAX_LENGTH {
            return Err(AppError::Validation(format!(
                "product name must not exceed {PRODUCT_NAME_MAX_LENGTH} characters"
            )));
        }

        if !price.is_finite() || price < 0.0 {
            return Err(AppError::Validation(
                "product price must be a non-negative number".to_owned(),
            ));
        }

        let description = description
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        Ok(Self {
            name,
            description,
            price,
            category_id: CategoryId::new(category_id)?,
        })
    }

    /// Returns the product name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the unit price.
    #[must_use]
    pub fn price(&self) -> f64 {
        self.price
    }

    /// Returns the owning category.
    #[must_use]
    pub fn category_id(&self) -> &CategoryId {
        &self.category_id
    }
}

/// A product as persisted by the store of record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Stable product identifier.
    pub id: ProductId,
    /// Display name, unique across the catalog.
    pub name: String,
    /// Optional long description.
    pub description: Option<String>,
    /// Unit price.
    pub price: f64,
    /// Owning category.
    pub category_id: CategoryId,
    /// Monotonic version, starting at 1 and incremented on every update.
    pub version: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{CategoryId, PRODUCT_NAME_MAX_LENGTH, ProductDraft, ProductId};

    #[test]
    fn draft_rejects_negative_price() {
        let draft = ProductDraft::new("Desk lamp", None, -1.0, "lighting");
        assert!(draft.is_err());
    }

    #[test]
    fn draft_rejects_non_finite_price() {
        assert!(ProductDraft::new("Desk lamp", None, f64::NAN, "lighting").is_err());
        assert!(ProductDraft::new("Desk lamp", None, f64::INFINITY, "lighting").is_err());
    }

    #[test]
    fn draft_trims_name_and_drops_blank_description() {
        let draft = ProductDraft::new("  Desk lamp ", Some("   ".to_owned()), 19.5, "lighting");
        assert!(draft.is_ok());
        let draft = draft.unwrap_or_else(|_| unreachable!());
        assert_eq!(draft.name(), "Desk lamp");
        assert_eq!(draft.description(), None);
        assert_eq!(draft.category_id().as_str(), "lighting");
    }

    #[test]
    fn draft_rejects_overlong_name() {
        let name = "x".repeat(PRODUCT_NAME_MAX_LENGTH + 1);
        assert!(ProductDraft::new(name, None, 1.0, "lighting").is_err());
    }

    #[test]
    fn product_id_parse_rejects_garbage() {
        assert!(ProductId::parse("not-a-uuid").is_err());
        let id = ProductId::new();
        assert_eq!(ProductId::parse(&id.to_string()).ok(), Some(id));
    }

    #[test]
    fn category_id_deserialization_rejects_empty_value() {
        let parsed = serde_json::from_str::<CategoryId>("\"  \"");
        assert!(parsed.is_err());
    }

    proptest! {
        #[test]
        fn whitespace_only_category_ids_are_rejected(value in "[ \t\n]{0,16}") {
            prop_assert!(CategoryId::new(value).is_err());
        }

        #[test]
        fn non_negative_prices_are_accepted(price in 0.0f64..1_000_000.0) {
            prop_assert!(ProductDraft::new("Item", None, price, "misc").is_ok());
        }
    }
}
