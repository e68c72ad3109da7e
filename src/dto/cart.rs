use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Product;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCartItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// One cart line joined with its live product record. `price` stays the
/// snapshot taken when the line was added.
#[derive(Debug, Serialize, ToSchema)]
pub struct CartItemDto {
    pub product: Product,
    pub quantity: i32,
    pub price: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartDto {
    pub id: Uuid,
    pub items: Vec<CartItemDto>,
    pub total_amount: i64,
}
