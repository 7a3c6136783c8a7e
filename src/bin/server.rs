use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use lap_circuit_server::conditions::QueryCondition;
use lap_circuit_server::config::LapConfig;
use lap_circuit_server::constants::{
    normalize_ranking_limit, AUTOSAVE_INTERVAL_MS, DEFAULT_CONFIG_PATH, DEFAULT_STATS_PATH,
};
use lap_circuit_server::engine::{LapEngine, PositionUpdate};
use lap_circuit_server::server_protocol::{parse_host_message, ParsedHostMessage};
use lap_circuit_server::server_utils::{now_ms, parse_ranking_limit};
use lap_circuit_server::stats_store::StatsStore;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type SharedState = Arc<Mutex<ServerState>>;

struct ServerState {
    clients: HashMap<String, mpsc::Sender<String>>,
    engine: LapEngine,
}

impl ServerState {
    fn new(engine: LapEngine) -> Self {
        Self {
            clients: HashMap::new(),
            engine,
        }
    }

    fn save_stats(&mut self) {
        if let Err(error) = self.engine.save_stats() {
            warn!(%error, "failed to save stats");
        }
    }
}

#[derive(Debug, Deserialize)]
struct RankingQuery {
    limit: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let config_path = std::env::var("LAP_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let stats_path = std::env::var("STATS_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_STATS_PATH));

    let config = match LapConfig::load(&config_path) {
        Ok(config) => config,
        Err(error) => {
            error!(path = %config_path.display(), %error, "error in configuration, not starting");
            std::process::exit(1);
        }
    };
    let engine = match LapEngine::from_config(&config, StatsStore::new(stats_path)) {
        Ok(engine) => engine,
        Err(error) => {
            error!(%error, "error in configuration, not starting");
            std::process::exit(1);
        }
    };
    info!(
        checkpoints = engine.track().len(),
        known_entities = engine.stats().len(),
        "track loaded"
    );

    let state = Arc::new(Mutex::new(ServerState::new(engine)));
    start_autosave_loop(state.clone());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/leaderboard", get(leaderboard_handler))
        .route("/ws", get(ws_handler))
        .with_state(state.clone());

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(error) => {
            error!(%bind_addr, %error, "failed to bind server socket");
            std::process::exit(1);
        }
    };

    info!("listening on :{port}");
    if let Err(error) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(%error, "server runtime failed");
    }

    state.lock().await.save_stats();
    info!("stats saved, bye");
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for ctrl-c");
    }
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn leaderboard_handler(
    State(state): State<SharedState>,
    Query(query): Query<RankingQuery>,
) -> impl IntoResponse {
    let guard = state.lock().await;
    let top = normalize_ranking_limit(
        parse_ranking_limit(query.limit.as_deref()),
        guard.engine.options().ranking_top,
    );
    Json(guard.engine.leaderboards(top))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = make_id("host");
    let (tx, mut rx) = mpsc::channel::<String>(256);
    state.lock().await.clients.insert(client_id.clone(), tx);
    info!(client = %client_id, "host bridge connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_host_message(&state, &client_id, raw.as_str()).await;
            }
            Message::Binary(raw) => match std::str::from_utf8(&raw) {
                Ok(text) => handle_host_message(&state, &client_id, text).await,
                Err(_) => {
                    let mut guard = state.lock().await;
                    send_error(&mut guard, &client_id, "invalid utf8 message");
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.lock().await.clients.remove(&client_id);
    info!(client = %client_id, "host bridge disconnected");
    let _ = writer.await;
}

async fn handle_host_message(state: &SharedState, client_id: &str, raw: &str) {
    let mut guard = state.lock().await;
    let Some(message) = parse_host_message(raw) else {
        send_error(&mut guard, client_id, "invalid message");
        return;
    };

    match message {
        ParsedHostMessage::Join { entity_id } => {
            guard.engine.handle_join(&entity_id);
        }
        ParsedHostMessage::Leave { entity_id } => {
            if guard.engine.handle_leave(&entity_id) {
                guard.save_stats();
            }
        }
        ParsedHostMessage::Move {
            entity_id,
            position,
            airborne,
            mounted,
            at_ms,
        } => {
            guard.engine.handle_position(&PositionUpdate {
                entity_id,
                position,
                airborne,
                mounted,
                now_ms: at_ms.unwrap_or_else(now_ms),
            });
        }
        ParsedHostMessage::Command { entity_id } => {
            let report = guard.engine.handle_command(&entity_id);
            match report {
                Some(report) => {
                    guard.save_stats();
                    send_to_client(
                        &mut guard,
                        client_id,
                        &json!({ "type": "report", "report": report }),
                    );
                }
                None => debug!(entity = %entity_id, "command ignored"),
            }
        }
        ParsedHostMessage::Condition {
            entity_id,
            instruction,
        } => {
            let message = match QueryCondition::parse(&instruction) {
                Ok(condition) => json!({
                    "type": "condition_result",
                    "entityId": entity_id,
                    "instruction": instruction,
                    "ok": guard.engine.check_condition(&entity_id, &condition),
                }),
                Err(error) => json!({
                    "type": "error",
                    "message": error.to_string(),
                }),
            };
            send_to_client(&mut guard, client_id, &message);
        }
        ParsedHostMessage::Ping { t } => {
            send_to_client(&mut guard, client_id, &json!({ "type": "pong", "t": t }));
        }
    }

    flush_events(&mut guard, client_id);
}

fn flush_events(state: &mut ServerState, client_id: &str) {
    let events = state.engine.drain_events();
    if events.is_empty() {
        return;
    }
    send_to_client(
        state,
        client_id,
        &json!({ "type": "events", "events": events }),
    );
}

fn start_autosave_loop(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(AUTOSAVE_INTERVAL_MS));
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            if guard.engine.needs_save() {
                guard.save_stats();
            }
        }
    });
}

fn send_to_client(state: &mut ServerState, client_id: &str, message: &Value) {
    let send_failed = match state.clients.get(client_id) {
        Some(tx) => tx.try_send(message.to_string()).is_err(),
        None => false,
    };
    if send_failed {
        warn!(client = %client_id, "outbound queue full, dropping client");
        state.clients.remove(client_id);
    }
}

fn send_error(state: &mut ServerState, client_id: &str, message: &str) {
    send_to_client(
        state,
        client_id,
        &json!({ "type": "error", "message": message }),
    );
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}
