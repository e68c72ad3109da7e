#![allow(dead_code)]

use axum_storefront_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool},
    entity::{products, users},
    middleware::auth::AuthUser,
    models::{ShippingAddress, User},
    state::AppState,
};
use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, Set};
use uuid::Uuid;

/// Build an AppState against the configured test database, or None so the
/// caller can skip when no database is available.
pub async fn setup_state() -> anyhow::Result<Option<AppState>> {
    let database_url =
        match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(url) => url,
            Err(_) => {
                eprintln!(
                    "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
                );
                return Ok(None);
            }
        };

    let pool = create_pool(&database_url).await?;
    let orm = create_orm_conn(&database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let config = AppConfig {
        database_url,
        host: "127.0.0.1".to_string(),
        port: 0,
        jwt_secret: "integration-test-secret".to_string(),
        token_ttl_days: 7,
    };

    Ok(Some(AppState { pool, orm, config }))
}

/// Insert a user with a throwaway unique email and wrap it the way the
/// identity gate would.
pub async fn create_user(state: &AppState, role: &str) -> anyhow::Result<AuthUser> {
    let id = Uuid::new_v4();
    let row = users::ActiveModel {
        id: Set(id),
        first_name: Set("Test".to_string()),
        last_name: Set("User".to_string()),
        email: Set(format!("{id}@example.com")),
        password_hash: Set("dummy".to_string()),
        role: Set(role.to_string()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser {
        user: User {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            password_hash: row.password_hash,
            role: row.role,
            created_at: row.created_at.with_timezone(&Utc),
        },
    })
}

pub async fn create_product(
    state: &AppState,
    name: &str,
    price: i64,
    quantity: i32,
) -> anyhow::Result<products::Model> {
    let product = products::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(format!("{name} {}", Uuid::new_v4())),
        description: Set(Some("integration test product".to_string())),
        category: Set("testing".to_string()),
        price: Set(price),
        quantity: Set(quantity),
        in_stock: Set(quantity > 0),
        images: Set(serde_json::json!([])),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(product)
}

pub async fn fetch_product(
    state: &AppState,
    id: Uuid,
) -> anyhow::Result<Option<products::Model>> {
    use sea_orm::EntityTrait;
    Ok(products::Entity::find_by_id(id).one(&state.orm).await?)
}

pub fn shipping_address() -> ShippingAddress {
    ShippingAddress {
        street: "1 Crab Lane".to_string(),
        city: "Ferrisburgh".to_string(),
        country: "US".to_string(),
        zip_code: "05456".to_string(),
    }
}
