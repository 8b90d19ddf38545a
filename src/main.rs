mod config;
mod database;
mod error;
mod filters;
mod handlers;
mod middleware;
mod models;
mod services;
mod utils;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    response::Redirect,
    routing::{get, post, put},
    Router,
};
use dotenvy::dotenv;
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use config::Config;
use database::{create_database_pool, ensure_admin_role, run_migrations, AppState};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenv().ok();

    env_logger::init();

    if let Err(e) = run().await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    let db = create_database_pool(&config.database_url).await?;
    if config.run_migrations {
        run_migrations(&db).await?;
        log::info!("Migrations applied");
    }
    ensure_admin_role(&db).await?;

    tokio::fs::create_dir_all(&config.receipt_dir).await?;

    let addr = format!("0.0.0.0:{}", config.port);
    let state = AppState {
        db,
        config: Arc::new(config),
    };
    let app = create_router(state);

    log::info!("Larder back office listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn create_router(state: AppState) -> Router {
    let receipts = Router::new()
        .fallback_service(ServeDir::new(&state.config.receipt_dir))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_pos_operator,
        ));

    Router::new()
        // Public routes
        .route("/", get(|| async { Redirect::permanent("/login") }))
        .route("/login", get(handlers::auth::login_page).post(handlers::auth::login))
        .route("/register", get(handlers::auth::register_page).post(handlers::auth::register))
        .route("/logout", post(handlers::auth::logout))

        .route("/dashboard", get(handlers::dashboard))

        // Inventory
        .route(
            "/api/inventory/items",
            get(handlers::inventory::list_items).post(handlers::inventory::create_item),
        )
        .route(
            "/api/inventory/items/:id",
            put(handlers::inventory::update_item).delete(handlers::inventory::delete_item),
        )
        .route("/api/inventory/items/:id/batches", get(handlers::inventory::list_batches))
        .route(
            "/api/inventory/categories",
            get(handlers::inventory::list_categories).post(handlers::inventory::create_category),
        )
        .route(
            "/api/inventory/categories/:id",
            axum::routing::delete(handlers::inventory::delete_category),
        )
        .route("/api/inventory/batches", post(handlers::inventory::receive_batch))
        .route("/api/inventory/adjustments", post(handlers::inventory::adjust_stock))
        .route("/api/inventory/transactions", get(handlers::inventory::list_transactions))
        .route("/api/consumption/forecast", post(handlers::inventory::consumption_forecast))

        // Recipes and production
        .route("/api/recipes", get(handlers::recipes::list).post(handlers::recipes::create))
        .route(
            "/api/recipes/:id",
            get(handlers::recipes::get)
                .put(handlers::recipes::update)
                .delete(handlers::recipes::delete),
        )
        .route("/api/recipes/:id/duplicate", post(handlers::recipes::duplicate))
        .route("/api/recipes/:id/approve", post(handlers::recipes::approve))
        .route("/api/recipes/:id/plan", post(handlers::recipes::plan))
        .route("/api/recipes/:id/produce", post(handlers::recipes::produce))

        // Products and menu categories
        .route("/api/products", get(handlers::products::list_products))
        .route("/api/products/:id", axum::routing::patch(handlers::products::update_product))
        .route(
            "/api/menu-categories",
            get(handlers::products::list_categories).post(handlers::products::create_category),
        )
        .route(
            "/api/menu-categories/:id",
            put(handlers::products::update_category).delete(handlers::products::delete_category),
        )

        // Point of sale
        .route("/api/pos/tables", get(handlers::pos::list_tables).post(handlers::pos::create_table))
        .route("/api/pos/tables/:id", axum::routing::delete(handlers::pos::delete_table))
        .route("/api/pos/tables/:id/ticket", post(handlers::pos::open_ticket))
        .route("/api/pos/tickets/:id", get(handlers::pos::get_ticket))
        .route("/api/pos/tickets/:id/lines", post(handlers::pos::add_line))
        .route(
            "/api/pos/tickets/:id/lines/:line_id",
            put(handlers::pos::set_quantity).delete(handlers::pos::remove_line),
        )
        .route("/api/pos/tickets/:id/send", post(handlers::pos::send_to_kitchen))
        .route("/api/pos/tickets/:id/checkout", post(handlers::pos::checkout))

        // Pricing
        .route("/api/pricing/ref-prices", get(handlers::pricing::list_ref_prices))
        .route("/api/pricing/ref-prices/:ingredient_id", put(handlers::pricing::upsert_ref_price))
        .route(
            "/api/pricing/suppliers",
            get(handlers::pricing::list_suppliers).post(handlers::pricing::create_supplier),
        )
        .route("/api/pricing/cost", post(handlers::pricing::recipe_cost))
        .route("/pricing/price-list", get(handlers::pricing::price_list))

        // Generated fiscal receipts
        .nest("/receipts", receipts)

        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CookieManagerLayer::new())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(2 * 1024 * 1024)),
        )
        .with_state(state)
}
