//! HTTP diagnostics and registry endpoints.

use axum::{
	extract::{Path, Query, State},
	http::StatusCode,
	response::{IntoResponse, Json, Response},
	routing::{delete, get, post},
	Router,
};
use oracle_core::{CoreError, OracleEngine};
use oracle_types::{current_timestamp, ChannelId, PairKey};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

const DEFAULT_ALERT_LIMIT: usize = 50;

pub struct ApiServer {
	host: String,
	port: u16,
	engine: Arc<OracleEngine>,
}

impl ApiServer {
	pub fn new(host: impl Into<String>, port: u16, engine: Arc<OracleEngine>) -> Self {
		Self {
			host: host.into(),
			port,
			engine,
		}
	}

	pub async fn run(self) -> anyhow::Result<()> {
		let listener = tokio::net::TcpListener::bind(format!("{}:{}", self.host, self.port)).await?;
		info!("API server listening on {}:{}", self.host, self.port);

		axum::serve(listener, router(self.engine)).await?;
		Ok(())
	}
}

pub fn router(engine: Arc<OracleEngine>) -> Router {
	Router::new()
		.route("/health", get(health_check))
		.route("/status", get(get_status))
		.route("/pairs", get(list_pairs))
		.route("/pairs/{base}/{quote}", get(get_pair))
		.route("/pairs/{base}/{quote}/submissions", get(latest_submissions))
		.route("/pairs/{base}/{quote}/channels", post(add_channel))
		.route("/pairs/{base}/{quote}/channels/{channel}", delete(remove_channel))
		.route("/pairs/{base}/{quote}/resume", post(resume_pair))
		.route("/channels/{channel}", get(get_channel))
		.route("/alerts", get(get_alerts))
		.route("/sources", get(get_sources))
		.with_state(engine)
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
}

/// Maps engine errors onto status codes with a JSON body.
struct ApiError(StatusCode, String);

impl From<CoreError> for ApiError {
	fn from(error: CoreError) -> Self {
		let status = match &error {
			CoreError::UnknownPair(_) | CoreError::UnknownChannel { .. } => StatusCode::NOT_FOUND,
			CoreError::AlreadyRegistered(_) => StatusCode::CONFLICT,
			CoreError::Configuration(_) => StatusCode::BAD_REQUEST,
			CoreError::Delivery(_) => StatusCode::BAD_GATEWAY,
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		};
		Self(status, error.to_string())
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		if self.0.is_server_error() {
			warn!("API request failed: {}", self.1);
		}
		(self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
	}
}

type ApiResult<T> = Result<T, ApiError>;

/// 200 while the engine runs, 503 otherwise.
async fn health_check(State(engine): State<Arc<OracleEngine>>) -> impl IntoResponse {
	let state = engine.lifecycle().state().await;
	let status = if engine.lifecycle().is_running().await {
		StatusCode::OK
	} else {
		StatusCode::SERVICE_UNAVAILABLE
	};
	(
		status,
		Json(serde_json::json!({
			"status": state.to_string(),
			"timestamp": current_timestamp(),
		})),
	)
}

async fn get_status(State(engine): State<Arc<OracleEngine>>) -> impl IntoResponse {
	Json(engine.status().await)
}

async fn list_pairs(State(engine): State<Arc<OracleEngine>>) -> impl IntoResponse {
	let mut pairs = Vec::new();
	for pair in engine.store().pairs() {
		if let Ok(status) = engine.pair_status(&pair).await {
			pairs.push(status);
		}
	}
	Json(pairs)
}

async fn get_pair(
	State(engine): State<Arc<OracleEngine>>,
	Path((base, quote)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
	Ok(Json(engine.pair_status(&PairKey::new(&base, &quote)).await?))
}

async fn latest_submissions(
	State(engine): State<Arc<OracleEngine>>,
	Path((base, quote)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
	let pair = PairKey::new(&base, &quote);
	if !engine.store().contains(&pair) {
		return Err(CoreError::UnknownPair(pair).into());
	}
	match engine.storage().latest_batch(&pair).await {
		Ok(Some(batch)) => Ok(Json(batch)),
		Ok(None) => Err(ApiError(
			StatusCode::NOT_FOUND,
			format!("No submissions recorded for {}", pair),
		)),
		Err(e) => Err(CoreError::Storage(e).into()),
	}
}

#[derive(Debug, Deserialize)]
struct AddChannelRequest {
	channel: String,
}

async fn add_channel(
	State(engine): State<Arc<OracleEngine>>,
	Path((base, quote)): Path<(String, String)>,
	Json(request): Json<AddChannelRequest>,
) -> ApiResult<impl IntoResponse> {
	if request.channel.trim().is_empty() {
		return Err(ApiError(StatusCode::BAD_REQUEST, "channel must not be empty".into()));
	}
	let pair = PairKey::new(&base, &quote);
	let channel = ChannelId::from(request.channel.trim());
	engine.orchestrator().add_channel(&pair, &channel).await?;
	engine
		.monitor()
		.sync_targets(engine.store().enabled_targets().await)
		.await;
	Ok((
		StatusCode::CREATED,
		Json(serde_json::json!({ "pair": pair, "channel": channel })),
	))
}

async fn remove_channel(
	State(engine): State<Arc<OracleEngine>>,
	Path((base, quote, channel)): Path<(String, String, String)>,
) -> ApiResult<impl IntoResponse> {
	let pair = PairKey::new(&base, &quote);
	engine
		.orchestrator()
		.remove_channel(&pair, &ChannelId::from(channel))
		.await?;
	engine
		.monitor()
		.sync_targets(engine.store().enabled_targets().await)
		.await;
	Ok(StatusCode::NO_CONTENT)
}

async fn resume_pair(
	State(engine): State<Arc<OracleEngine>>,
	Path((base, quote)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
	let pair = PairKey::new(&base, &quote);
	let resumed = engine.orchestrator().resume_pair(&pair).await?;
	Ok(Json(serde_json::json!({ "pair": pair, "resumed": resumed })))
}

async fn get_channel(
	State(engine): State<Arc<OracleEngine>>,
	Path(channel): Path<String>,
) -> ApiResult<impl IntoResponse> {
	let entries = engine.monitor().channel_detail(&ChannelId::from(channel.as_str())).await;
	if entries.is_empty() {
		return Err(ApiError(
			StatusCode::NOT_FOUND,
			format!("Channel {} is not monitored", channel),
		));
	}
	Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
struct AlertQuery {
	limit: Option<usize>,
}

async fn get_alerts(
	State(engine): State<Arc<OracleEngine>>,
	Query(query): Query<AlertQuery>,
) -> impl IntoResponse {
	let limit = query.limit.unwrap_or(DEFAULT_ALERT_LIMIT);
	Json(engine.monitor().recent_alerts(limit).await)
}

async fn get_sources(State(engine): State<Arc<OracleEngine>>) -> impl IntoResponse {
	let sources = engine.sources();
	Json(serde_json::json!({
		"offline": sources.is_offline(),
		"sources": sources.source_names(),
		"metrics": sources.metrics().snapshot(),
	}))
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use axum::body::{to_bytes, Body};
	use axum::http::Request;
	use oracle_config::{OracleConfig, PairConfig};
	use oracle_core::{OracleBuilder, RunMode};
	use oracle_delivery::implementations::dry_run::DryRunLedger;
	use oracle_delivery::Ledger;
	use oracle_sources::{SourceError, SourceInterface};
	use oracle_storage::implementations::memory::MemoryStorage;
	use oracle_types::Observation;
	use std::time::Duration;
	use tower::ServiceExt;

	struct Quote(&'static str, u64);

	#[async_trait]
	impl SourceInterface for Quote {
		fn name(&self) -> &str {
			self.0
		}

		async fn fetch_price(&self, pair: &PairKey) -> Result<Observation, SourceError> {
			Ok(Observation::new(self.0, pair.clone(), self.1, current_timestamp()))
		}
	}

	fn engine() -> Arc<OracleEngine> {
		let mut config = OracleConfig::default();
		config.oracle.dry_run = true;
		config.coordination.stagger_secs = 0;
		config.pairs = vec![PairConfig {
			base: "STX".into(),
			quote: "USD".into(),
			min_sources: 1,
			channels: vec!["SP1".into(), "SP2".into()],
		}];
		Arc::new(
			OracleBuilder::new(config)
				.with_sources(vec![Box::new(Quote("a", 10_000)), Box::new(Quote("b", 10_004))])
				.with_ledger(Ledger::from_backend(DryRunLedger::new(vec![])))
				.with_storage(Box::new(MemoryStorage::new()))
				.build()
				.unwrap(),
		)
	}

	async fn call(engine: &Arc<OracleEngine>, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, serde_json::Value) {
		let mut request = Request::builder().method(method).uri(uri);
		let body = match body {
			Some(body) => {
				request = request.header("content-type", "application/json");
				Body::from(body.to_string())
			}
			None => Body::empty(),
		};
		let response = router(engine.clone())
			.oneshot(request.body(body).unwrap())
			.await
			.unwrap();
		let status = response.status();
		let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		let json = if bytes.is_empty() {
			serde_json::Value::Null
		} else {
			serde_json::from_slice(&bytes).unwrap()
		};
		(status, json)
	}

	#[tokio::test]
	async fn test_health_reflects_lifecycle() {
		let engine = engine();
		let (status, body) = call(&engine, "GET", "/health", None).await;
		assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
		assert_eq!(body["status"], "uninitialized");

		let runner = engine.clone();
		let handle = tokio::spawn(async move { runner.run(RunMode::Coordinator).await });
		for _ in 0..50 {
			if engine.lifecycle().is_running().await {
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		let (status, _) = call(&engine, "GET", "/health", None).await;
		assert_eq!(status, StatusCode::OK);

		engine.shutdown().await.unwrap();
		handle.await.unwrap().unwrap();
	}

	#[tokio::test]
	async fn test_submissions_and_pair_status() {
		let engine = engine();
		let pair = PairKey::new("STX", "USD");

		let (status, _) = call(&engine, "GET", "/pairs/STX/USD/submissions", None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);

		engine.coordinator().run_pair_cycle(&pair).await.unwrap();

		let (status, body) = call(&engine, "GET", "/pairs/stx/usd/submissions", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["price"], 10_004);
		assert_eq!(body["records"].as_array().unwrap().len(), 2);

		let (status, body) = call(&engine, "GET", "/pairs", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body[0]["pair"], "STX/USD");
		assert_eq!(body[0]["submission_count"], 1);

		let (status, _) = call(&engine, "GET", "/pairs/BTC/USD", None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
	}

	#[tokio::test]
	async fn test_channel_registry_endpoints() {
		let engine = engine();

		let (status, _) = call(&engine, "POST", "/pairs/STX/USD/channels", Some(r#"{"channel":"SP3"}"#)).await;
		assert_eq!(status, StatusCode::CREATED);
		let (status, _) = call(&engine, "POST", "/pairs/STX/USD/channels", Some(r#"{"channel":"SP3"}"#)).await;
		assert_eq!(status, StatusCode::CONFLICT);

		let (status, body) = call(&engine, "GET", "/channels/SP3", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body[0]["status"], "offline");

		let (status, _) = call(&engine, "DELETE", "/pairs/STX/USD/channels/SP3", None).await;
		assert_eq!(status, StatusCode::NO_CONTENT);
		let (status, _) = call(&engine, "DELETE", "/pairs/STX/USD/channels/SP3", None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		let (status, _) = call(&engine, "GET", "/channels/SP3", None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);

		let (status, body) = call(&engine, "POST", "/pairs/STX/USD/resume", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["resumed"], false);
	}

	#[tokio::test]
	async fn test_status_alerts_and_sources() {
		let engine = engine();

		let (status, body) = call(&engine, "GET", "/status", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["dry_run"], true);
		assert_eq!(body["coordinator"]["channels"], 2);

		let (status, body) = call(&engine, "GET", "/alerts?limit=5", None).await;
		assert_eq!(status, StatusCode::OK);
		assert!(body.as_array().unwrap().is_empty());

		let (status, body) = call(&engine, "GET", "/sources", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["sources"], serde_json::json!(["a", "b"]));
	}
}
