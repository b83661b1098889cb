//! Product Model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Product document as persisted in the remote catalog
///
/// `name` is stored trimmed and lowercase so that the uniqueness check is
/// case-insensitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub quantity: u32,
    /// Creation time (epoch millis)
    pub date_added: i64,
    /// Public download URL of the product image
    pub cloud_photo_url: Option<String>,
    /// Object storage key of the product image
    pub image_path: Option<String>,
    /// Username of the staff member who last changed this product
    pub updated_by: Option<String>,
}

/// Uploaded image payload
///
/// Serializes without the bytes so validation errors stay small.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct ImageUpload {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl ImageUpload {
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }
}

impl std::fmt::Debug for ImageUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageUpload")
            .field("len", &self.bytes.len())
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// Create product payload
#[derive(Debug, Clone, Validate)]
pub struct ProductCreate {
    #[validate(
        custom(function = "not_blank", message = "Please provide product name!"),
        length(max = 120, message = "Product name is too long!")
    )]
    pub name: String,
    #[validate(length(
        min = 10,
        max = 2000,
        message = "Please provide a meaningful description for this product!"
    ))]
    pub description: String,
    #[validate(custom(
        function = "non_negative",
        message = "Please provide a valid product price!"
    ))]
    pub price: Decimal,
    pub quantity: u32,
    #[validate(custom(
        function = "valid_image",
        message = "Product image is required!"
    ))]
    pub image: ImageUpload,
}

/// New price and quantity recorded by a stock transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub quantity: u32,
}

impl StockAdjustment {
    /// Whether applying this adjustment would leave the product unchanged
    pub fn is_noop_for(&self, product: &Product) -> bool {
        self.price == product.price && self.quantity == product.quantity
    }
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("required"));
    }
    Ok(())
}

fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new("range"));
    }
    Ok(())
}

fn valid_image(image: &ImageUpload) -> Result<(), ValidationError> {
    if image.bytes.is_empty() || !image.content_type.starts_with("image/") {
        return Err(ValidationError::new("image"));
    }
    Ok(())
}
