use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use clap::Parser;
use packer_api::{CreateItemRequest, CreateTripRequest, PackerApi, API_CONTRACT_VERSION};
use packer_core::{
    Item, ItemId, ItemPatch, KernelError, PackingDecision, PackingLimits, RecommendedItem, Trip,
    TripId, TripPatch,
};
use packer_store_sqlite::SqliteStore;
use serde::Serialize;
use ulid::Ulid;

const SERVICE_CONTRACT_VERSION: &str = "service.v1";
const OPENAPI_YAML: &str = include_str!("../../../openapi/openapi.yaml");

#[derive(Clone)]
struct ServiceState {
    api: PackerApi,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceEnvelope<T>
where
    T: Serialize,
{
    service_contract_version: &'static str,
    api_contract_version: &'static str,
    data: T,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    #[serde(skip)]
    status: StatusCode,
    service_contract_version: &'static str,
    error: String,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Debug, Parser)]
#[command(name = "packer-service")]
#[command(about = "Local HTTP service for the travel packer core")]
struct Args {
    /// Database location. The default keeps all state in memory for the
    /// lifetime of the process.
    #[arg(long, default_value = ":memory:")]
    db: PathBuf,
    #[arg(long, default_value = "127.0.0.1:4020")]
    bind: SocketAddr,
    #[arg(long, default_value_t = packer_core::DEFAULT_WEIGHT_LIMIT_KG)]
    weight_limit_kg: f64,
    #[arg(long, default_value_t = packer_core::DEFAULT_VOLUME_LIMIT_CM3)]
    volume_limit_cm3: f64,
}

impl ServiceError {
    fn from_anyhow(err: &anyhow::Error) -> Self {
        let status = match err.downcast_ref::<KernelError>() {
            Some(KernelError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Some(KernelError::Validation(_) | KernelError::InvalidMeasurement(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            None => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            service_contract_version: SERVICE_CONTRACT_VERSION,
            error: format!("{err:#}"),
        }
    }

    fn not_found(kind: &str, id: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            service_contract_version: SERVICE_CONTRACT_VERSION,
            error: format!("{kind} not found: {id}"),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

fn envelope<T>(data: T) -> ServiceEnvelope<T>
where
    T: Serialize,
{
    ServiceEnvelope {
        service_contract_version: SERVICE_CONTRACT_VERSION,
        api_contract_version: API_CONTRACT_VERSION,
        data,
    }
}

fn parse_item_id(raw: &str) -> Result<ItemId, ServiceError> {
    Ulid::from_string(raw).map(ItemId).map_err(|_| ServiceError::not_found("item", raw))
}

fn parse_trip_id(raw: &str) -> Result<TripId, ServiceError> {
    Ulid::from_string(raw).map(TripId).map_err(|_| ServiceError::not_found("trip", raw))
}

fn map_err(err: anyhow::Error) -> ServiceError {
    ServiceError::from_anyhow(&err)
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/openapi", get(openapi))
        .route("/v1/items", post(item_create).get(item_list))
        .route("/v1/items/:item_id", get(item_get).patch(item_update).delete(item_delete))
        .route("/v1/items/:item_id/weight", post(item_weight))
        .route("/v1/items/:item_id/detection", post(item_detection))
        .route("/v1/trips", post(trip_create).get(trip_list))
        .route("/v1/trips/:trip_id", get(trip_get).patch(trip_update).delete(trip_delete))
        .route("/v1/trips/:trip_id/items", get(trip_items))
        .route("/v1/trips/:trip_id/items/:item_id", put(trip_associate).delete(trip_disassociate))
        .route("/v1/trips/:trip_id/items/:item_id/decision", post(trip_decision))
        .route("/v1/trips/:trip_id/recalculate", post(trip_recalculate))
        .route("/v1/trips/:trip_id/baseline", get(trip_baseline))
        .route("/v1/trips/:trip_id/weather", post(trip_weather))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut store = SqliteStore::open(&args.db)?;
    store.migrate()?;
    let limits = PackingLimits {
        weight_limit_kg: args.weight_limit_kg,
        volume_limit_cm3: args.volume_limit_cm3,
    };
    let state = ServiceState { api: PackerApi::new(store, limits) };

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!(bind = %args.bind, "packer-service listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health() -> Json<ServiceEnvelope<HealthResponse>> {
    Json(envelope(HealthResponse { status: "ok" }))
}

async fn openapi() -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "application/yaml; charset=utf-8")], OPENAPI_YAML)
}

async fn item_create(
    State(state): State<ServiceState>,
    Json(request): Json<CreateItemRequest>,
) -> Result<Json<ServiceEnvelope<Item>>, ServiceError> {
    let item = state.api.create_item(request).map_err(map_err)?;
    Ok(Json(envelope(item)))
}

async fn item_list(
    State(state): State<ServiceState>,
) -> Result<Json<ServiceEnvelope<Vec<Item>>>, ServiceError> {
    let items = state.api.list_items().map_err(map_err)?;
    Ok(Json(envelope(items)))
}

async fn item_get(
    State(state): State<ServiceState>,
    Path(item_id): Path<String>,
) -> Result<Json<ServiceEnvelope<Item>>, ServiceError> {
    let item_id = parse_item_id(&item_id)?;
    let item = state.api.get_item(item_id).map_err(map_err)?;
    Ok(Json(envelope(item)))
}

async fn item_update(
    State(state): State<ServiceState>,
    Path(item_id): Path<String>,
    Json(patch): Json<ItemPatch>,
) -> Result<Json<ServiceEnvelope<Item>>, ServiceError> {
    let item_id = parse_item_id(&item_id)?;
    let item = state.api.update_item(item_id, patch).map_err(map_err)?;
    Ok(Json(envelope(item)))
}

async fn item_delete(
    State(state): State<ServiceState>,
    Path(item_id): Path<String>,
) -> Result<Json<ServiceEnvelope<MessageResponse>>, ServiceError> {
    let item_id = parse_item_id(&item_id)?;
    state.api.delete_item(item_id).map_err(map_err)?;
    Ok(Json(envelope(MessageResponse { message: "Item deleted successfully".to_string() })))
}

async fn item_weight(
    State(state): State<ServiceState>,
    Path(item_id): Path<String>,
) -> Result<Json<ServiceEnvelope<Item>>, ServiceError> {
    let item_id = parse_item_id(&item_id)?;
    let item = state.api.record_weight(item_id).map_err(map_err)?;
    Ok(Json(envelope(item)))
}

async fn item_detection(
    State(state): State<ServiceState>,
    Path(item_id): Path<String>,
    image: Bytes,
) -> Result<Json<ServiceEnvelope<Item>>, ServiceError> {
    let item_id = parse_item_id(&item_id)?;
    let item = state.api.record_detection(item_id, &image).map_err(map_err)?;
    Ok(Json(envelope(item)))
}

async fn trip_create(
    State(state): State<ServiceState>,
    Json(request): Json<CreateTripRequest>,
) -> Result<Json<ServiceEnvelope<Trip>>, ServiceError> {
    let trip = state.api.create_trip(request).map_err(map_err)?;
    Ok(Json(envelope(trip)))
}

async fn trip_list(
    State(state): State<ServiceState>,
) -> Result<Json<ServiceEnvelope<Vec<Trip>>>, ServiceError> {
    let trips = state.api.list_trips().map_err(map_err)?;
    Ok(Json(envelope(trips)))
}

async fn trip_get(
    State(state): State<ServiceState>,
    Path(trip_id): Path<String>,
) -> Result<Json<ServiceEnvelope<Trip>>, ServiceError> {
    let trip_id = parse_trip_id(&trip_id)?;
    let trip = state.api.get_trip(trip_id).map_err(map_err)?;
    Ok(Json(envelope(trip)))
}

async fn trip_update(
    State(state): State<ServiceState>,
    Path(trip_id): Path<String>,
    Json(patch): Json<TripPatch>,
) -> Result<Json<ServiceEnvelope<Trip>>, ServiceError> {
    let trip_id = parse_trip_id(&trip_id)?;
    let trip = state.api.update_trip(trip_id, patch).map_err(map_err)?;
    Ok(Json(envelope(trip)))
}

async fn trip_delete(
    State(state): State<ServiceState>,
    Path(trip_id): Path<String>,
) -> Result<Json<ServiceEnvelope<MessageResponse>>, ServiceError> {
    let trip_id = parse_trip_id(&trip_id)?;
    state.api.delete_trip(trip_id).map_err(map_err)?;
    Ok(Json(envelope(MessageResponse { message: "Trip deleted successfully".to_string() })))
}

async fn trip_items(
    State(state): State<ServiceState>,
    Path(trip_id): Path<String>,
) -> Result<Json<ServiceEnvelope<Vec<Item>>>, ServiceError> {
    let trip_id = parse_trip_id(&trip_id)?;
    let items = state.api.trip_items(trip_id).map_err(map_err)?;
    Ok(Json(envelope(items)))
}

async fn trip_associate(
    State(state): State<ServiceState>,
    Path((trip_id, item_id)): Path<(String, String)>,
) -> Result<Json<ServiceEnvelope<Trip>>, ServiceError> {
    let trip_id = parse_trip_id(&trip_id)?;
    let item_id = parse_item_id(&item_id)?;
    state.api.associate(item_id, trip_id).map_err(map_err)?;
    let trip = state.api.get_trip(trip_id).map_err(map_err)?;
    Ok(Json(envelope(trip)))
}

async fn trip_disassociate(
    State(state): State<ServiceState>,
    Path((trip_id, item_id)): Path<(String, String)>,
) -> Result<Json<ServiceEnvelope<Trip>>, ServiceError> {
    let trip_id = parse_trip_id(&trip_id)?;
    let item_id = parse_item_id(&item_id)?;
    state.api.disassociate(item_id, trip_id).map_err(map_err)?;
    let trip = state.api.get_trip(trip_id).map_err(map_err)?;
    Ok(Json(envelope(trip)))
}

async fn trip_decision(
    State(state): State<ServiceState>,
    Path((trip_id, item_id)): Path<(String, String)>,
) -> Result<Json<ServiceEnvelope<PackingDecision>>, ServiceError> {
    let trip_id = parse_trip_id(&trip_id)?;
    let item_id = parse_item_id(&item_id)?;
    let decision = state.api.decide(trip_id, item_id).map_err(map_err)?;
    Ok(Json(envelope(decision)))
}

async fn trip_recalculate(
    State(state): State<ServiceState>,
    Path(trip_id): Path<String>,
) -> Result<Json<ServiceEnvelope<Trip>>, ServiceError> {
    let trip_id = parse_trip_id(&trip_id)?;
    let trip = state.api.recalculate(trip_id).map_err(map_err)?;
    Ok(Json(envelope(trip)))
}

async fn trip_baseline(
    State(state): State<ServiceState>,
    Path(trip_id): Path<String>,
) -> Result<Json<ServiceEnvelope<Vec<RecommendedItem>>>, ServiceError> {
    let trip_id = parse_trip_id(&trip_id)?;
    let recommendations = state.api.baseline(trip_id).map_err(map_err)?;
    Ok(Json(envelope(recommendations)))
}

async fn trip_weather(
    State(state): State<ServiceState>,
    Path(trip_id): Path<String>,
) -> Result<Json<ServiceEnvelope<Trip>>, ServiceError> {
    let trip_id = parse_trip_id(&trip_id)?;
    let trip = state.api.refresh_weather(trip_id).map_err(map_err)?;
    Ok(Json(envelope(trip)))
}
