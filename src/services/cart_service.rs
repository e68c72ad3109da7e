use std::collections::HashMap;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::cart::{AddToCartRequest, CartDto, CartItemDto, UpdateCartItemRequest},
    entity::{
        cart_items::{
            ActiveModel as CartItemActive, Column as CartItemCol, Entity as CartItems,
        },
        carts::{ActiveModel as CartActive, Column as CartCol, Entity as Carts, Model as CartModel},
        products::{Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    services::product_service::product_from_entity,
    state::AppState,
};

pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartDto>> {
    // Created lazily on first access.
    let cart = match Carts::find()
        .filter(CartCol::UserId.eq(user.id()))
        .one(&state.orm)
        .await?
    {
        Some(c) => c,
        None => new_cart(&state.orm, user.id()).await?,
    };

    let mut data = populate_cart(&state.orm, &cart).await?;

    // Lines can change out-of-band (product cascade delete); the stored
    // total self-heals on read.
    let computed: i64 = data
        .items
        .iter()
        .map(|item| item.price * i64::from(item.quantity))
        .sum();
    if computed != cart.total_amount {
        let mut active: CartActive = cart.into();
        active.total_amount = Set(computed);
        active.updated_at = Set(Utc::now().into());
        active.update(&state.orm).await?;
        data.total_amount = computed;
    }

    Ok(ApiResponse::success("OK", data, Some(Meta::empty())))
}

pub async fn add_item(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartDto>> {
    if payload.quantity < 1 {
        return Err(AppError::BadRequest("quantity must be at least 1".into()));
    }

    let txn = state.orm.begin().await?;
    let cart = cart_for_update(&txn, user.id()).await?;

    let product = Products::find_by_id(payload.product_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let product = match product {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    let existing = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .filter(CartItemCol::ProductId.eq(payload.product_id))
        .one(&txn)
        .await?;

    // Same product merges into the existing line, never a duplicate.
    let merged = existing.as_ref().map(|l| l.quantity).unwrap_or(0) + payload.quantity;
    if !product.in_stock || product.quantity < merged {
        return Err(AppError::BadRequest(format!(
            "Insufficient stock for {}",
            product.name
        )));
    }

    match existing {
        Some(line) => {
            let mut active: CartItemActive = line.into();
            active.quantity = Set(merged);
            active.update(&txn).await?;
        }
        None => {
            // New line snapshots the product's current price.
            CartItemActive {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(payload.product_id),
                quantity: Set(payload.quantity),
                price: Set(product.price),
                created_at: NotSet,
            }
            .insert(&txn)
            .await?;
        }
    }

    let cart = persist_total(&txn, cart).await?;
    let data = populate_cart(&txn, &cart).await?;
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.id()),
        "cart_add",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": payload.product_id, "quantity": payload.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Added to cart",
        data,
        Some(Meta::empty()),
    ))
}

pub async fn update_item(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartDto>> {
    if payload.quantity < 0 {
        return Err(AppError::BadRequest(
            "quantity must not be negative".into(),
        ));
    }

    let txn = state.orm.begin().await?;
    let cart = cart_for_update(&txn, user.id()).await?;

    let line = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .filter(CartItemCol::ProductId.eq(payload.product_id))
        .one(&txn)
        .await?;
    let line = match line {
        Some(l) => l,
        None => return Err(AppError::NotFound),
    };

    if payload.quantity == 0 {
        let active: CartItemActive = line.into();
        active.delete(&txn).await?;
    } else {
        let product = Products::find_by_id(line.product_id)
            .lock(LockType::Update)
            .one(&txn)
            .await?;
        let product = match product {
            Some(p) => p,
            None => return Err(AppError::NotFound),
        };
        if !product.in_stock || product.quantity < payload.quantity {
            return Err(AppError::BadRequest(format!(
                "Insufficient stock for {}",
                product.name
            )));
        }
        // Quantity is overwritten; the price snapshot stays.
        let mut active: CartItemActive = line.into();
        active.quantity = Set(payload.quantity);
        active.update(&txn).await?;
    }

    let cart = persist_total(&txn, cart).await?;
    let data = populate_cart(&txn, &cart).await?;
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.id()),
        "cart_update",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": payload.product_id, "quantity": payload.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Cart updated", data, Some(Meta::empty())))
}

pub async fn remove_item(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<CartDto>> {
    let txn = state.orm.begin().await?;
    let cart = cart_for_update(&txn, user.id()).await?;

    // No error when the line is already gone.
    CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart.id))
        .filter(CartItemCol::ProductId.eq(product_id))
        .exec(&txn)
        .await?;

    let cart = persist_total(&txn, cart).await?;
    let data = populate_cart(&txn, &cart).await?;
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.id()),
        "cart_remove",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": product_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Removed from cart",
        data,
        Some(Meta::empty()),
    ))
}

pub async fn clear_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartDto>> {
    let txn = state.orm.begin().await?;
    let cart = cart_for_update(&txn, user.id()).await?;

    CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(&txn)
        .await?;

    let cart = persist_total(&txn, cart).await?;
    let data = populate_cart(&txn, &cart).await?;
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.id()),
        "cart_clear",
        Some("cart_items"),
        None,
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Cart cleared", data, Some(Meta::empty())))
}

async fn new_cart<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> AppResult<CartModel> {
    let cart = CartActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        total_amount: Set(0),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(conn)
    .await?;
    Ok(cart)
}

/// Fetch (or lazily create) the caller's cart with a row lock so concurrent
/// mutations of the same cart serialize.
async fn cart_for_update(txn: &DatabaseTransaction, user_id: Uuid) -> AppResult<CartModel> {
    let existing = Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .lock(LockType::Update)
        .one(txn)
        .await?;
    match existing {
        Some(cart) => Ok(cart),
        None => new_cart(txn, user_id).await,
    }
}

/// Recompute `total_amount` from the lines and persist it. Runs after every
/// mutation, inside the mutation's transaction.
async fn persist_total(txn: &DatabaseTransaction, cart: CartModel) -> AppResult<CartModel> {
    let lines = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .all(txn)
        .await?;
    let total: i64 = lines
        .iter()
        .map(|line| line.price * i64::from(line.quantity))
        .sum();

    let mut active: CartActive = cart.into();
    active.total_amount = Set(total);
    active.updated_at = Set(Utc::now().into());
    let cart = active.update(txn).await?;
    Ok(cart)
}

async fn populate_cart<C: ConnectionTrait>(conn: &C, cart: &CartModel) -> AppResult<CartDto> {
    let lines = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .order_by_asc(CartItemCol::CreatedAt)
        .all(conn)
        .await?;

    if lines.is_empty() {
        return Ok(CartDto {
            id: cart.id,
            items: Vec::new(),
            total_amount: cart.total_amount,
        });
    }

    let product_ids: Vec<Uuid> = lines.iter().map(|line| line.product_id).collect();
    let products: HashMap<Uuid, ProductModel> = Products::find()
        .filter(crate::entity::products::Column::Id.is_in(product_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let items = lines
        .into_iter()
        .filter_map(|line| {
            products.get(&line.product_id).cloned().map(|p| CartItemDto {
                product: product_from_entity(p),
                quantity: line.quantity,
                price: line.price,
            })
        })
        .collect();

    Ok(CartDto {
        id: cart.id,
        items,
        total_amount: cart.total_amount,
    })
}
