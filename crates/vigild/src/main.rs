//! vigild - camera-or-stream enforcement service
//!
//! This is the main entry point for the vigild service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - Compliance monitor
//! - Intent dispatcher and the bridge actuator
//! - IPC server

mod bridge;

use anyhow::{Context, Result};
use bridge::BridgeActuator;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use vigil_api::{
    ClientRole, Command, ErrorCode, ErrorInfo, Event, EventPayload, HealthStatus, Response,
    ResponsePayload,
};
use vigil_config::load_config;
use vigil_core::{ComplianceMonitor, CoreEvent, IntentDispatcher};
use vigil_ipc::{IpcServer, ServerMessage};
use vigil_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use vigil_util::{ClientId, RateLimiter, VigilError, default_config_path};

/// Upper bound on audit records returned per request
const MAX_AUDIT_LIMIT: usize = 1000;

/// Per-client request budget for queries and control commands
const RATE_LIMIT_REQUESTS: u32 = 30;
const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(1);

/// vigild - keeps monitored voice channels camera-or-stream only
#[derive(Parser, Debug)]
#[command(name = "vigild")]
#[command(about = "Camera-or-stream enforcement for monitored voice channels", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/vigil/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set VIGIL_SOCKET env var)
    #[arg(short, long, env = "VIGIL_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set VIGIL_DATA_DIR env var)
    #[arg(short, long, env = "VIGIL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Service {
    monitor: ComplianceMonitor,
    core_events: mpsc::UnboundedReceiver<CoreEvent>,
    dispatcher: IntentDispatcher,
    ipc: Arc<IpcServer>,
    store: Arc<dyn Store>,
    rate_limiter: RateLimiter,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let policy = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            channel_count = policy.channels.len(),
            "Configuration loaded"
        );

        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| policy.service.socket_path.clone());

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| policy.service.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = data_dir.join("vigild.db");
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted {
            channel_count: policy.channels.len(),
        }))?;

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start()
            .await
            .with_context(|| format!("Failed to bind socket {:?}", socket_path))?;
        let ipc = Arc::new(ipc);

        info!(socket_path = %socket_path.display(), "IPC server started");

        let actuator = Arc::new(BridgeActuator::new(ipc.clone()));
        let dispatcher = IntentDispatcher::new(actuator, policy.notices.clone(), store.clone());
        let (monitor, core_events) = ComplianceMonitor::new(&policy, store.clone());

        let rate_limiter = RateLimiter::new(RATE_LIMIT_REQUESTS, RATE_LIMIT_INTERVAL);

        Ok(Self {
            monitor,
            core_events,
            dispatcher,
            ipc,
            store,
            rate_limiter,
        })
    }

    async fn run(self) -> Result<()> {
        let Service {
            monitor,
            mut core_events,
            dispatcher,
            ipc,
            store,
            mut rate_limiter,
        } = self;

        let mut ipc_messages = ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let ipc_accept = ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup =
            signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                // Transitions, including those made by timers
                Some(event) = core_events.recv() => {
                    Self::handle_core_event(&dispatcher, &ipc, event);
                }

                Some(msg) = ipc_messages.recv() => {
                    Self::handle_ipc_message(&monitor, &ipc, &store, &mut rate_limiter, msg).await;
                }
            }
        }

        info!("Shutting down vigild");

        let closed = monitor.shutdown().await;
        info!(sessions = closed.len(), "Sessions closed");

        // Publish the closures the shutdown produced
        while let Ok(event) = core_events.try_recv() {
            Self::handle_core_event(&dispatcher, &ipc, event);
        }

        ipc.broadcast_event(Event::new(EventPayload::Shutdown));

        if let Err(e) = store.append_audit(AuditEvent::new(AuditEventType::ServiceStopped)) {
            warn!(error = %e, "Failed to log service shutdown");
        }

        info!("Shutdown complete");
        Ok(())
    }

    fn handle_core_event(dispatcher: &IntentDispatcher, ipc: &Arc<IpcServer>, event: CoreEvent) {
        let payload = match event {
            CoreEvent::Enforce {
                participant_id,
                intents,
                ..
            } => {
                debug!(participant_id = %participant_id, count = intents.len(), "Dispatching intents");
                // Detached; the dispatcher logs and audits its own outcome
                drop(dispatcher.dispatch(intents));
                return;
            }
            CoreEvent::SessionOpened {
                participant_id,
                channel_id,
                phase,
            } => EventPayload::SessionOpened {
                participant_id,
                channel_id,
                phase,
            },
            CoreEvent::PhaseChanged {
                participant_id,
                channel_id,
                from,
                to,
            } => EventPayload::PhaseChanged {
                participant_id,
                channel_id,
                from,
                to,
            },
            CoreEvent::SessionClosed {
                participant_id,
                channel_id,
                reason,
            } => EventPayload::SessionClosed {
                participant_id,
                channel_id,
                reason,
            },
        };

        ipc.broadcast_event(Event::new(payload));
    }

    async fn handle_ipc_message(
        monitor: &ComplianceMonitor,
        ipc: &Arc<IpcServer>,
        store: &Arc<dyn Store>,
        rate_limiter: &mut RateLimiter,
        msg: ServerMessage,
    ) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                // Voice-state notifications are never dropped: a lost join or
                // presence change would leave the session table wrong
                let limited = !matches!(request.command, Command::StateChange(_))
                    && !rate_limiter.check(&client_id);
                if limited {
                    let response = Response::error(
                        request.request_id,
                        ErrorInfo::new(ErrorCode::RateLimited, VigilError::RateLimited.to_string()),
                    );
                    let _ = ipc.send_response(&client_id, response).await;
                    return;
                }

                let response = Self::handle_command(
                    monitor,
                    ipc,
                    store,
                    &client_id,
                    request.request_id,
                    request.command,
                )
                .await;

                let _ = ipc.send_response(&client_id, response).await;
            }

            ServerMessage::ClientConnected { client_id, info } => {
                info!(
                    client_id = %client_id,
                    role = ?info.role,
                    uid = ?info.uid,
                    "Client connected"
                );

                if let Err(e) = store.append_audit(AuditEvent::new(AuditEventType::ClientConnected {
                    client_id: client_id.to_string(),
                    role: format!("{:?}", info.role),
                    uid: info.uid,
                })) {
                    warn!(error = %e, "Failed to append audit event");
                }
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");

                if let Err(e) = store.append_audit(AuditEvent::new(AuditEventType::ClientDisconnected {
                    client_id: client_id.to_string(),
                })) {
                    warn!(error = %e, "Failed to append audit event");
                }

                rate_limiter.remove_client(&client_id);
            }
        }
    }

    async fn handle_command(
        monitor: &ComplianceMonitor,
        ipc: &Arc<IpcServer>,
        store: &Arc<dyn Store>,
        client_id: &ClientId,
        request_id: u64,
        command: Command,
    ) -> Response {
        let role = ipc
            .get_client_info(client_id)
            .await
            .map_or(ClientRole::Observer, |info| info.role);

        match command {
            Command::StateChange(change) => {
                if !role.can_push_state() {
                    return error_response(
                        request_id,
                        VigilError::permission("state changes require the admin role"),
                    );
                }

                let transitions = monitor.on_state_change(change);
                Response::success(
                    request_id,
                    ResponsePayload::Applied {
                        transitions: transitions.len(),
                    },
                )
            }

            Command::GetState => Response::success(request_id, ResponsePayload::State(monitor.snapshot())),

            Command::GetSession { participant_id } => match monitor.session(&participant_id) {
                Ok(info) => Response::success(request_id, ResponsePayload::Session(info)),
                Err(e) => error_response(request_id, e),
            },

            Command::GetAuditLog { limit } => {
                if !role.can_read_audit() {
                    return error_response(
                        request_id,
                        VigilError::permission("the audit log requires the admin role"),
                    );
                }

                let records = store
                    .get_recent_audits(limit.min(MAX_AUDIT_LIMIT))
                    .map_err(|e| e.to_string())
                    .and_then(|events| {
                        events
                            .iter()
                            .map(serde_json::to_value)
                            .collect::<Result<Vec<_>, _>>()
                            .map_err(|e| e.to_string())
                    });

                match records {
                    Ok(records) => Response::success(request_id, ResponsePayload::AuditLog(records)),
                    Err(message) => Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::StoreError, message),
                    ),
                }
            }

            Command::SubscribeEvents => Response::success(
                request_id,
                ResponsePayload::Subscribed {
                    client_id: client_id.clone(),
                },
            ),

            Command::UnsubscribeEvents => {
                Response::success(request_id, ResponsePayload::Unsubscribed)
            }

            Command::GetHealth => {
                let health = HealthStatus {
                    live: true,
                    ready: true,
                    actuator_ok: ipc.subscriber_count().await > 0,
                    store_ok: store.is_healthy(),
                    session_count: monitor.session_count(),
                };
                Response::success(request_id, ResponsePayload::Health(health))
            }

            Command::Ping => Response::success(request_id, ResponsePayload::Pong),
        }
    }
}

fn error_response(request_id: u64, err: VigilError) -> Response {
    let code = match &err {
        VigilError::NoSession(_) => ErrorCode::NoSession,
        VigilError::PermissionDenied(_) => ErrorCode::PermissionDenied,
        VigilError::RateLimited => ErrorCode::RateLimited,
    };
    Response::error(request_id, ErrorInfo::new(code, err.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "vigild starting");

    let service = Service::new(&args).await?;
    service.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use vigil_api::{Presence, StateChange};
    use vigil_config::parse_config;
    use vigil_ipc::{IpcClient, IpcError};
    use vigil_store::{SqliteStore, StoreError, StoreResult};
    use vigil_util::ParticipantId;

    const CONFIG: &str = r#"
config_version = 1

[[channels]]
id = "focus"
"#;

    /// Store whose disk is gone
    struct BrokenStore;

    impl Store for BrokenStore {
        fn append_audit(&self, _event: AuditEvent) -> StoreResult<()> {
            Err(StoreError::Database("disk I/O error".into()))
        }

        fn get_recent_audits(&self, _limit: usize) -> StoreResult<Vec<AuditEvent>> {
            Err(StoreError::Database("disk I/O error".into()))
        }

        fn get_participant_audits(
            &self,
            _participant_id: &ParticipantId,
            _limit: usize,
        ) -> StoreResult<Vec<AuditEvent>> {
            Err(StoreError::Database("disk I/O error".into()))
        }

        fn is_healthy(&self) -> bool {
            false
        }
    }

    async fn serve(socket_path: &std::path::Path) -> ComplianceMonitor {
        serve_with(socket_path, Arc::new(SqliteStore::in_memory().unwrap())).await
    }

    /// Start a socket server whose requests go through `handle_ipc_message`,
    /// the same path the daemon's event loop uses
    async fn serve_with(socket_path: &std::path::Path, store: Arc<dyn Store>) -> ComplianceMonitor {
        let policy = parse_config(CONFIG).unwrap();
        let (monitor, _events) = ComplianceMonitor::new(&policy, store.clone());

        let mut server = IpcServer::new(socket_path);
        server.start().await.unwrap();
        let ipc = Arc::new(server);
        let mut messages = ipc.take_message_receiver().await.unwrap();

        let accept = ipc.clone();
        tokio::spawn(async move {
            let _ = accept.run().await;
        });

        let handler = monitor.clone();
        tokio::spawn(async move {
            let mut limiter = RateLimiter::new(RATE_LIMIT_REQUESTS, RATE_LIMIT_INTERVAL);
            while let Some(msg) = messages.recv().await {
                Service::handle_ipc_message(&handler, &ipc, &store, &mut limiter, msg).await;
            }
        });

        monitor
    }

    #[tokio::test]
    async fn state_change_burst_is_never_rate_limited() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("vigild.sock");
        let monitor = serve(&socket_path).await;

        let mut client = IpcClient::connect(&socket_path).await.unwrap();
        let burst = RATE_LIMIT_REQUESTS as usize + 10;
        for n in 0..burst {
            let change = StateChange::join(format!("u{n}"), "focus", Presence::camera());
            assert_eq!(client.push_state_change(change).await.unwrap(), 1);
        }

        assert_eq!(monitor.session_count(), burst);
        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn query_burst_is_rate_limited() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("vigild.sock");
        let monitor = serve(&socket_path).await;

        let mut client = IpcClient::connect(&socket_path).await.unwrap();
        let mut limited = 0;
        for _ in 0..RATE_LIMIT_REQUESTS + 5 {
            match client.call(Command::Ping).await {
                Ok(_) => {}
                Err(IpcError::Rejected { code, .. }) => {
                    assert_eq!(code, ErrorCode::RateLimited);
                    limited += 1;
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(limited > 0);

        // Notifications still get through with the bucket drained
        let change = StateChange::join("late", "focus", Presence::camera());
        assert_eq!(client.push_state_change(change).await.unwrap(), 1);
        assert_eq!(monitor.session_count(), 1);
        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn audit_failures_do_not_stop_request_handling() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("vigild.sock");
        let monitor = serve_with(&socket_path, Arc::new(BrokenStore)).await;

        // Connect and disconnect both try to audit
        drop(IpcClient::connect(&socket_path).await.unwrap());

        let mut client = IpcClient::connect(&socket_path).await.unwrap();
        let change = StateChange::join("u1", "focus", Presence::camera());
        assert_eq!(client.push_state_change(change).await.unwrap(), 1);

        match client.call(Command::GetHealth).await.unwrap() {
            ResponsePayload::Health(health) => {
                assert!(!health.store_ok);
                assert_eq!(health.session_count, 1);
            }
            other => panic!("unexpected payload: {:?}", other),
        }

        match client.call(Command::GetAuditLog { limit: 10 }).await {
            Err(IpcError::Rejected { code, .. }) => assert_eq!(code, ErrorCode::StoreError),
            other => panic!("expected a store error, got {:?}", other),
        }
        monitor.shutdown().await;
    }
}
