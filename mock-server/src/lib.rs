//! In-memory EcoMarket API used by the client's integration tests.
//!
//! Products live in a `BTreeMap` behind a `RwLock` and are reseeded on every
//! `app()` call. `Behavior` adds artificial latency per route, an optional
//! bearer token for `/perfil`, and the duration of `/test/slow`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info, warn};

pub const CATEGORIES: [&str; 5] = ["frutas", "verduras", "lacteos", "miel", "conservas"];

const CREATED_AT: &str = "2024-01-01T00:00:00Z";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Producer {
    pub id: u64,
    pub nombre: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub nombre: String,
    pub precio: f64,
    pub categoria: String,
    pub disponible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub productor: Option<Producer>,
    pub stock: u32,
    pub creado_en: String,
}

#[derive(Deserialize)]
pub struct NewProduct {
    pub nombre: String,
    pub precio: f64,
    pub categoria: String,
    pub descripcion: Option<String>,
    #[serde(default = "available")]
    pub disponible: bool,
    #[serde(default)]
    pub stock: u32,
}

fn available() -> bool {
    true
}

#[derive(Deserialize, Default)]
pub struct ProductPatch {
    pub nombre: Option<String>,
    pub precio: Option<f64>,
    pub categoria: Option<String>,
    pub descripcion: Option<String>,
    pub disponible: Option<bool>,
    pub stock: Option<u32>,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub categoria: Option<String>,
    pub orden: Option<String>,
}

/// Routes with configurable latency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Route {
    Products,
    Categories,
    Profile,
    Notifications,
}

#[derive(Clone, Debug)]
pub struct Behavior {
    latency: HashMap<Route, Duration>,
    token: Option<String>,
    slow: Duration,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            latency: HashMap::new(),
            token: None,
            slow: Duration::from_secs(10),
        }
    }
}

impl Behavior {
    pub fn with_latency(mut self, route: Route, latency: Duration) -> Self {
        self.latency.insert(route, latency);
        self
    }

    /// Require `Authorization: Bearer <token>` on `/perfil`.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_slow(mut self, slow: Duration) -> Self {
        self.slow = slow;
        self
    }

    async fn delay(&self, route: Route) {
        if let Some(latency) = self.latency.get(&route) {
            tokio::time::sleep(*latency).await;
        }
    }
}

pub struct Store {
    products: BTreeMap<u64, Product>,
    next_id: u64,
}

impl Store {
    fn seeded() -> Self {
        let seed = [
            (1, "Manzanas Orgánicas", 25.5, "frutas", 100, "2024-01-15T10:30:00Z"),
            (2, "Leche Artesanal", 30.0, "lacteos", 50, "2024-01-16T11:00:00Z"),
            (3, "Miel de Abeja", 80.0, "miel", 20, "2024-01-17T09:15:00Z"),
        ];
        let products = seed
            .into_iter()
            .map(|(id, nombre, precio, categoria, stock, creado_en)| {
                let product = Product {
                    id,
                    nombre: nombre.to_string(),
                    precio,
                    categoria: categoria.to_string(),
                    disponible: true,
                    descripcion: None,
                    productor: Some(Producer {
                        id: 1,
                        nombre: "Granja Sol".to_string(),
                    }),
                    stock,
                    creado_en: creado_en.to_string(),
                };
                (id, product)
            })
            .collect();
        Self {
            products,
            next_id: 4,
        }
    }

    fn name_taken(&self, nombre: &str, except: Option<u64>) -> bool {
        self.products
            .values()
            .any(|p| Some(p.id) != except && p.nombre.to_lowercase() == nombre.to_lowercase())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<RwLock<Store>>,
    pub behavior: Arc<Behavior>,
}

type Failure = (StatusCode, Json<Value>);

fn failure(status: StatusCode, message: impl Into<String>) -> Failure {
    (status, Json(json!({ "error": message.into() })))
}

pub fn app() -> Router {
    app_with(Behavior::default())
}

pub fn app_with(behavior: Behavior) -> Router {
    let state = AppState {
        db: Arc::new(RwLock::new(Store::seeded())),
        behavior: Arc::new(behavior),
    };
    Router::new()
        .route("/productos", get(list_products).post(create_product))
        .route(
            "/productos/{id}",
            get(get_product)
                .put(replace_product)
                .patch(patch_product)
                .delete(delete_product),
        )
        .route("/categorias", get(list_categories))
        .route("/perfil", get(get_profile))
        .route("/notificaciones", get(list_notifications))
        .route("/test/error500", get(error_500))
        .route("/test/error401", get(error_401))
        .route("/test/invalid-json", get(invalid_json))
        .route("/test/invalid-product", get(invalid_product))
        .route("/test/slow", get(slow))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with(listener, Behavior::default()).await
}

pub async fn run_with(listener: TcpListener, behavior: Behavior) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "mock server listening");
    }
    axum::serve(listener, app_with(behavior)).await
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if status >= 400 {
        warn!(%method, %path, status, elapsed_ms, "request failed");
    } else {
        info!(%method, %path, status, elapsed_ms, "request");
    }
    response
}

async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<Product>> {
    state.behavior.delay(Route::Products).await;
    let db = state.db.read().await;
    let mut products: Vec<Product> = db
        .products
        .values()
        .filter(|p| query.categoria.as_deref().map_or(true, |c| p.categoria == c))
        .cloned()
        .collect();
    match query.orden.as_deref() {
        Some("precio") => products.sort_by(|a, b| a.precio.total_cmp(&b.precio)),
        Some("-precio") => products.sort_by(|a, b| b.precio.total_cmp(&a.precio)),
        Some("nombre") => products.sort_by(|a, b| a.nombre.cmp(&b.nombre)),
        _ => {}
    }
    Json(products)
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Product>, Failure> {
    state.behavior.delay(Route::Products).await;
    let db = state.db.read().await;
    db.products
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "Producto no encontrado"))
}

async fn create_product(
    State(state): State<AppState>,
    Json(input): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), Failure> {
    state.behavior.delay(Route::Products).await;
    check_fields(&input.nombre, input.precio, &input.categoria)?;

    let mut db = state.db.write().await;
    if db.name_taken(&input.nombre, None) {
        return Err(failure(
            StatusCode::CONFLICT,
            format!("Ya existe un producto con el nombre '{}'", input.nombre),
        ));
    }
    let id = db.next_id;
    db.next_id += 1;
    let product = Product {
        id,
        nombre: input.nombre,
        precio: input.precio,
        categoria: input.categoria,
        disponible: input.disponible,
        descripcion: input.descripcion,
        productor: None,
        stock: input.stock,
        creado_en: CREATED_AT.to_string(),
    };
    db.products.insert(id, product.clone());
    debug!(id, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

async fn replace_product(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(input): Json<NewProduct>,
) -> Result<Json<Product>, Failure> {
    state.behavior.delay(Route::Products).await;
    check_fields(&input.nombre, input.precio, &input.categoria)?;

    let mut db = state.db.write().await;
    if db.name_taken(&input.nombre, Some(id)) {
        return Err(failure(
            StatusCode::CONFLICT,
            format!("Ya existe otro producto con el nombre '{}'", input.nombre),
        ));
    }
    let product = db
        .products
        .get_mut(&id)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "Producto no encontrado"))?;
    *product = Product {
        id,
        nombre: input.nombre,
        precio: input.precio,
        categoria: input.categoria,
        disponible: input.disponible,
        descripcion: input.descripcion,
        productor: product.productor.clone(),
        stock: input.stock,
        creado_en: product.creado_en.clone(),
    };
    Ok(Json(product.clone()))
}

async fn patch_product(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(patch): Json<ProductPatch>,
) -> Result<Json<Product>, Failure> {
    state.behavior.delay(Route::Products).await;
    let mut db = state.db.write().await;
    if let Some(nombre) = &patch.nombre {
        if db.name_taken(nombre, Some(id)) {
            return Err(failure(
                StatusCode::CONFLICT,
                format!("Ya existe otro producto con el nombre '{nombre}'"),
            ));
        }
    }
    let product = db
        .products
        .get_mut(&id)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "Producto no encontrado"))?;

    let mut updated = product.clone();
    if let Some(nombre) = patch.nombre {
        updated.nombre = nombre;
    }
    if let Some(precio) = patch.precio {
        updated.precio = precio;
    }
    if let Some(categoria) = patch.categoria {
        updated.categoria = categoria;
    }
    if let Some(descripcion) = patch.descripcion {
        updated.descripcion = Some(descripcion);
    }
    if let Some(disponible) = patch.disponible {
        updated.disponible = disponible;
    }
    if let Some(stock) = patch.stock {
        updated.stock = stock;
    }
    check_fields(&updated.nombre, updated.precio, &updated.categoria)?;
    *product = updated;
    Ok(Json(product.clone()))
}

async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, Failure> {
    state.behavior.delay(Route::Products).await;
    let mut db = state.db.write().await;
    db.products
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "Producto no encontrado"))
}

async fn list_categories(State(state): State<AppState>) -> Json<[&'static str; 5]> {
    state.behavior.delay(Route::Categories).await;
    Json(CATEGORIES)
}

async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, Failure> {
    state.behavior.delay(Route::Profile).await;
    if let Some(expected) = &state.behavior.token {
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented != Some(expected.as_str()) {
            return Err(failure(StatusCode::UNAUTHORIZED, "Token inválido o expirado"));
        }
    }
    Ok(Json(json!({
        "id": 1,
        "nombre": "Usuario Test",
        "email": "test@ecomarket.com"
    })))
}

async fn list_notifications(State(state): State<AppState>) -> Json<Value> {
    state.behavior.delay(Route::Notifications).await;
    Json(json!([
        {"id": 1, "mensaje": "Tu pedido #1024 fue enviado", "leida": false},
        {"id": 2, "mensaje": "Nuevo productor: Granja Sol", "leida": true}
    ]))
}

async fn error_500() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

async fn error_401() -> impl IntoResponse {
    (StatusCode::UNAUTHORIZED, "Unauthorized")
}

async fn invalid_json() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/html")],
        "<html><body>Error</body></html>",
    )
}

/// A product that breaks the schema: negative price, unknown category.
async fn invalid_product() -> Json<Value> {
    Json(json!({
        "id": 999,
        "nombre": "Producto Malicioso",
        "precio": -100,
        "categoria": "test",
        "stock": 10
    }))
}

async fn slow(State(state): State<AppState>) -> Json<Value> {
    tokio::time::sleep(state.behavior.slow).await;
    Json(json!({ "delayed": true }))
}

fn check_fields(nombre: &str, precio: f64, categoria: &str) -> Result<(), Failure> {
    if nombre.trim().is_empty() {
        return Err(failure(
            StatusCode::UNPROCESSABLE_ENTITY,
            "El campo 'nombre' es requerido",
        ));
    }
    if !(precio.is_finite() && precio > 0.0) {
        return Err(failure(
            StatusCode::UNPROCESSABLE_ENTITY,
            "El campo 'precio' debe ser mayor que 0",
        ));
    }
    if !CATEGORIES.contains(&categoria) {
        return Err(failure(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Categoría '{categoria}' no válida"),
        ));
    }
    Ok(())
}
