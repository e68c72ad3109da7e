use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{AuthResponse, LoginRequest, RegisterRequest},
        cart::{AddToCartRequest, CartDto, CartItemDto, UpdateCartItemRequest},
        orders::{CreateOrderRequest, OrderList, OrderWithItems},
        products::{
            CreateProductRequest, InventoryAdjustRequest, LowStockQuery, ProductList,
            UpdateProductRequest,
        },
    },
    models::{Order, OrderItem, Product, ShippingAddress, User},
    response::{ApiResponse, Meta},
    routes::{admin, auth, cart, health, orders, params, products},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::profile,
        products::list_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        products::list_low_stock,
        products::adjust_inventory,
        cart::get_cart,
        cart::add_item,
        cart::update_item,
        cart::remove_item,
        cart::clear_cart,
        orders::list_orders,
        orders::create_order,
        orders::get_order,
        orders::cancel_order,
        admin::list_all_orders,
        admin::update_order_status
    ),
    components(
        schemas(
            User,
            Product,
            ShippingAddress,
            Order,
            OrderItem,
            RegisterRequest,
            LoginRequest,
            AuthResponse,
            CreateProductRequest,
            UpdateProductRequest,
            ProductList,
            LowStockQuery,
            InventoryAdjustRequest,
            AddToCartRequest,
            UpdateCartItemRequest,
            CartItemDto,
            CartDto,
            CreateOrderRequest,
            OrderWithItems,
            OrderList,
            admin::UpdateOrderStatusRequest,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<CartDto>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<AuthResponse>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Products", description = "Catalog endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Admin", description = "Administrative order endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
