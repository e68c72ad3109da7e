mod common;

use axum_storefront_api::{
    dto::cart::{AddToCartRequest, UpdateCartItemRequest},
    dto::products::UpdateProductRequest,
    services::{cart_service, product_service},
};
use uuid::Uuid;

#[tokio::test]
async fn adding_the_same_product_merges_lines() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let user = common::create_user(&state, "user").await?;
    let product = common::create_product(&state, "Widget", 1000, 10).await?;

    cart_service::add_item(
        &state,
        &user,
        AddToCartRequest {
            product_id: product.id,
            quantity: 2,
        },
    )
    .await?;
    let resp = cart_service::add_item(
        &state,
        &user,
        AddToCartRequest {
            product_id: product.id,
            quantity: 3,
        },
    )
    .await?;

    let cart = resp.data.expect("cart");
    assert_eq!(cart.items.len(), 1, "expected a single merged line");
    assert_eq!(cart.items[0].quantity, 5);
    assert_eq!(cart.items[0].price, 1000);
    assert_eq!(cart.total_amount, 5000);

    Ok(())
}

#[tokio::test]
async fn merge_beyond_stock_is_rejected() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let user = common::create_user(&state, "user").await?;
    let product = common::create_product(&state, "Scarce", 1000, 4).await?;

    cart_service::add_item(
        &state,
        &user,
        AddToCartRequest {
            product_id: product.id,
            quantity: 3,
        },
    )
    .await?;
    let err = cart_service::add_item(
        &state,
        &user,
        AddToCartRequest {
            product_id: product.id,
            quantity: 2,
        },
    )
    .await
    .expect_err("merged quantity above stock accepted");
    assert!(err.to_string().contains("Insufficient stock"));

    // the original line is untouched
    let cart = cart_service::get_cart(&state, &user).await?.data.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 3);

    Ok(())
}

#[tokio::test]
async fn add_validates_product_and_quantity() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let user = common::create_user(&state, "user").await?;
    let product = common::create_product(&state, "Gone", 500, 0).await?;

    let err = cart_service::add_item(
        &state,
        &user,
        AddToCartRequest {
            product_id: product.id,
            quantity: 1,
        },
    )
    .await
    .expect_err("out-of-stock product accepted");
    assert!(err.to_string().contains("Insufficient stock"));

    assert!(
        cart_service::add_item(
            &state,
            &user,
            AddToCartRequest {
                product_id: product.id,
                quantity: 0,
            },
        )
        .await
        .is_err()
    );

    assert!(
        cart_service::add_item(
            &state,
            &user,
            AddToCartRequest {
                product_id: Uuid::new_v4(),
                quantity: 1,
            },
        )
        .await
        .is_err()
    );

    Ok(())
}

#[tokio::test]
async fn update_overwrites_and_zero_removes() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let user = common::create_user(&state, "user").await?;
    let product = common::create_product(&state, "Adjustable", 250, 10).await?;

    cart_service::add_item(
        &state,
        &user,
        AddToCartRequest {
            product_id: product.id,
            quantity: 2,
        },
    )
    .await?;

    let resp = cart_service::update_item(
        &state,
        &user,
        UpdateCartItemRequest {
            product_id: product.id,
            quantity: 7,
        },
    )
    .await?;
    let cart = resp.data.unwrap();
    assert_eq!(cart.items[0].quantity, 7);
    assert_eq!(cart.total_amount, 1750);

    // beyond stock
    assert!(
        cart_service::update_item(
            &state,
            &user,
            UpdateCartItemRequest {
                product_id: product.id,
                quantity: 11,
            },
        )
        .await
        .is_err()
    );

    // zero removes the line
    let resp = cart_service::update_item(
        &state,
        &user,
        UpdateCartItemRequest {
            product_id: product.id,
            quantity: 0,
        },
    )
    .await?;
    let cart = resp.data.unwrap();
    assert!(cart.items.is_empty());
    assert_eq!(cart.total_amount, 0);

    Ok(())
}

#[tokio::test]
async fn remove_is_idempotent_and_clear_empties() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let user = common::create_user(&state, "user").await?;
    let product = common::create_product(&state, "Clearable", 100, 5).await?;

    cart_service::add_item(
        &state,
        &user,
        AddToCartRequest {
            product_id: product.id,
            quantity: 2,
        },
    )
    .await?;

    // removing an absent line is not an error
    let resp = cart_service::remove_item(&state, &user, Uuid::new_v4()).await?;
    assert_eq!(resp.data.unwrap().items.len(), 1);

    let resp = cart_service::remove_item(&state, &user, product.id).await?;
    let cart = resp.data.unwrap();
    assert!(cart.items.is_empty());
    assert_eq!(cart.total_amount, 0);

    cart_service::add_item(
        &state,
        &user,
        AddToCartRequest {
            product_id: product.id,
            quantity: 1,
        },
    )
    .await?;
    let cart = cart_service::clear_cart(&state, &user).await?.data.unwrap();
    assert!(cart.items.is_empty());
    assert_eq!(cart.total_amount, 0);

    Ok(())
}

#[tokio::test]
async fn line_price_is_a_snapshot_of_add_time() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let user = common::create_user(&state, "user").await?;
    let product = common::create_product(&state, "Volatile", 1000, 10).await?;

    cart_service::add_item(
        &state,
        &user,
        AddToCartRequest {
            product_id: product.id,
            quantity: 2,
        },
    )
    .await?;

    // catalog price changes after the line was added
    product_service::update_product(
        &state,
        &user,
        product.id,
        UpdateProductRequest {
            name: None,
            description: None,
            category: None,
            price: Some(9999),
            quantity: None,
            images: None,
        },
    )
    .await?;

    let cart = cart_service::get_cart(&state, &user).await?.data.unwrap();
    assert_eq!(cart.items[0].price, 1000, "snapshot must not follow catalog");
    assert_eq!(cart.items[0].product.price, 9999, "live product is joined");
    assert_eq!(cart.total_amount, 2000);

    Ok(())
}
