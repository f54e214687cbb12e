//! Test station implementing the ACP management protocol.
//!
//! Listens on the management port, runs one [`acp_session::Session`] per
//! accepted connection, and dispatches messages by command: property
//! reads and writes against a pluggable [`PropertyStore`], SRP
//! authentication with mid-session encryption install, monitor event
//! push, RPC through an application [`RpcHandler`] hook, features, echo,
//! and firmware sinks.
//!
//! The station answers property exchanges as one message whose body is
//! the element run plus the sentinel. (Deployed firmware sometimes
//! streams the elements after a bare acknowledgement instead; the client
//! side accepts both shapes.)
//!
//! A connection handles one message at a time: while a command is being
//! dispatched, further bytes simply accumulate in the session buffer.

mod auth;
pub mod error;
pub mod rpc;
pub mod store;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use acp_proto::{
    Command, Message, ProtocolError, Value,
    monitor::compose_monitor_frame,
    payloads::rpc::RpcRequest,
    property::{
        FLAG_ERROR, PropName, Property, PropertyValue, RawElement, SENTINEL, compose_element,
        lookup, parse_element_list,
    },
    status,
};
use acp_session::{Exchange, Session, SessionError};
use bytes::Bytes;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::broadcast,
};

pub use error::ServerError;
pub use rpc::{NullRpcHandler, RpcHandler};
pub use store::{MemoryStore, PropertyStore, StoreError};

use crate::auth::{AuthStep, Authenticator};

/// Default listen address.
pub const DEFAULT_BIND: &str = "0.0.0.0:5009";

/// Idle read deadline; expiry just re-arms the read.
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Buffered monitor events per subscriber before lagging.
const EVENT_CAPACITY: usize = 64;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on, e.g. `"0.0.0.0:5009"`.
    pub bind_address: String,
    /// Administrator password clients must prove.
    pub password: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: DEFAULT_BIND.to_owned(), password: "public".to_owned() }
    }
}

struct StationState<S> {
    password: String,
    store: S,
    rpc: Box<dyn RpcHandler>,
    features: Value,
    events: broadcast::Sender<Value>,
}

/// The test station.
pub struct Server<S: PropertyStore> {
    listener: TcpListener,
    state: Arc<StationState<S>>,
}

impl<S: PropertyStore> Server<S> {
    /// Bind the listener and assemble the station state.
    pub async fn bind(
        config: ServerConfig,
        store: S,
        rpc: impl RpcHandler,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.bind_address)
            .await
            .map_err(|err| ServerError::Bind(format!("{}: {err}", config.bind_address)))?;

        Ok(Self {
            listener,
            state: Arc::new(StationState {
                password: config.password,
                store,
                rpc: Box::new(rpc),
                features: default_features(),
                events: broadcast::channel(EVENT_CAPACITY).0,
            }),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::from)
    }

    /// Accept connections until the process ends.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!(address = %self.local_addr()?, "station listening");

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "connection accepted");
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(err) = serve_connection(stream, state).await {
                            tracing::debug!(%peer, %err, "connection ended with error");
                        }
                    });
                },
                Err(err) => {
                    tracing::error!(%err, "accept failed");
                },
            }
        }
    }
}

/// Capability list answered to `GetFeatures`.
fn default_features() -> Value {
    Value::Array(vec![
        Value::from("properties"),
        Value::from("monitor"),
        Value::from("rpc"),
        Value::from("firmware"),
    ])
}

async fn serve_connection<S: PropertyStore>(
    stream: TcpStream,
    state: Arc<StationState<S>>,
) -> Result<(), ServerError> {
    let session = Session::from_stream(stream);
    let mut exchange = session.queue().await?;
    let mut auth = Authenticator::new(state.password.clone());

    loop {
        let message = match exchange.receive_message_timeout(IDLE_TIMEOUT).await {
            Ok(message) => message,
            Err(SessionError::Timeout) => continue,
            Err(SessionError::Protocol(err)) => {
                tracing::warn!(%err, "bad frame; receive buffer dropped");
                continue;
            },
            Err(SessionError::Canceled | SessionError::NotConnected) => break,
            Err(err) => {
                tracing::debug!(%err, "receive failed");
                break;
            },
        };

        tracing::debug!(command = %message.command, "dispatching");
        match message.command {
            Command::Echo => {
                exchange.send(&Message::response(&message, 0, message.body.clone())).await?;
            },

            Command::GetProperty => {
                let Some(body) = message.body.as_deref() else {
                    tracing::warn!("streaming get-property rejected");
                    break;
                };
                match handle_get(&state, body) {
                    Ok(reply) => {
                        exchange.send(&Message::response(&message, 0, Some(reply.into()))).await?;
                    },
                    Err(err) => tracing::warn!(%err, "malformed get-property body"),
                }
            },

            Command::SetProperty => {
                let Some(body) = message.body.as_deref() else {
                    tracing::warn!("streaming set-property rejected");
                    break;
                };
                match handle_set(&state, body) {
                    Ok((reply, events)) => {
                        exchange.send(&Message::response(&message, 0, Some(reply.into()))).await?;
                        for event in events {
                            let _ = state.events.send(event);
                        }
                    },
                    Err(err) => tracing::warn!(%err, "malformed set-property body"),
                }
            },

            Command::Monitor => {
                let subscription = state.events.subscribe();
                exchange.send(&Message::response(&message, 0, None)).await?;
                run_monitor(&mut exchange, subscription, message.body.as_deref()).await;
                break;
            },

            Command::Rpc => {
                let Some(body) = message.body.as_deref() else {
                    tracing::warn!("streaming rpc rejected");
                    break;
                };
                match RpcRequest::decode(body) {
                    Ok(call) => {
                        let response = state.rpc.call(&call.function, &call.inputs);
                        exchange
                            .send(&Message::response(&message, 0, Some(response.encode().into())))
                            .await?;
                    },
                    Err(err) => tracing::warn!(%err, "malformed rpc body"),
                }
            },

            Command::Authenticate => {
                let Some(body) = message.body.as_deref() else {
                    tracing::warn!("streaming authenticate rejected");
                    break;
                };
                match auth.handle(body) {
                    Ok(AuthStep::Reply(reply)) => {
                        exchange.send(&Message::response(&message, 0, Some(reply.into()))).await?;
                    },
                    Ok(AuthStep::Reject) => {
                        exchange
                            .send(&Message::response(
                                &message,
                                status::INCORRECT_PASSWORD,
                                None,
                            ))
                            .await?;
                    },
                    Ok(AuthStep::Accept { body, key, client_iv, server_iv }) => {
                        exchange.send(&Message::response(&message, 0, Some(body.into()))).await?;
                        exchange.enable_server_encryption(&key, &client_iv, &server_iv)?;
                    },
                    Err(err) => tracing::warn!(%err, "malformed authenticate body"),
                }
            },

            Command::GetFeatures => {
                let body = state.features.compose();
                exchange.send(&Message::response(&message, 0, Some(body.into()))).await?;
            },

            Command::FlashPrimary | Command::FlashSecondary | Command::FlashBootloader => {
                let Some(body) = message.body.as_ref() else {
                    tracing::warn!("streaming flash rejected");
                    break;
                };
                tracing::info!(command = %message.command, bytes = body.len(), "firmware image received");
                exchange.send(&Message::response(&message, 0, Some(Bytes::new()))).await?;
            },

            Command::Perform => {
                exchange.send(&Message::response(&message, 0, Some(Bytes::new()))).await?;
            },

            Command::Reserved4 | Command::Reserved23 => {
                tracing::debug!(command = %message.command, "ignoring undocumented command");
            },
        }
    }

    Ok(())
}

fn error_element(name: PropName, code: i32) -> Vec<u8> {
    compose_element(FLAG_ERROR, &Property::new(name, code.to_be_bytes().to_vec()))
}

/// Answer a get-property body: one element per requested name, errors
/// inline, sentinel-terminated.
fn handle_get<S: PropertyStore>(
    state: &StationState<S>,
    body: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let requests = parse_element_list(body)?;

    let mut out = Vec::new();
    for request in &requests {
        match state.store.get(request.name) {
            Ok(Some(value)) => {
                out.extend_from_slice(&compose_element(0, &Property::new(request.name, value)));
            },
            Ok(None) => out.extend_from_slice(&error_element(request.name, status::INVALID_KEY)),
            Err(err) => {
                tracing::error!(%err, name = %request.name, "store read failed");
                out.extend_from_slice(&error_element(request.name, status::NOT_AVAILABLE));
            },
        }
    }
    out.extend_from_slice(&SENTINEL);
    Ok(out)
}

/// Apply a set-property body. Returns the response record run and the
/// change events to broadcast to monitor subscribers.
fn handle_set<S: PropertyStore>(
    state: &StationState<S>,
    body: &[u8],
) -> Result<(Vec<u8>, Vec<Value>), ProtocolError> {
    let records = parse_element_list(body)?;

    let mut out = Vec::new();
    let mut events = Vec::new();
    for record in &records {
        let code = apply_set(state, record);
        if code == 0 {
            out.extend_from_slice(&compose_element(
                0,
                &Property::new(record.name, vec![0u8; 4]),
            ));
            events.push(Value::dict(vec![
                ("name", Value::from(record.name.to_string())),
                ("value", Value::Data(record.value.to_vec())),
            ]));
        } else {
            out.extend_from_slice(&error_element(record.name, code));
        }
    }
    out.extend_from_slice(&SENTINEL);
    Ok((out, events))
}

fn apply_set<S: PropertyStore>(state: &StationState<S>, record: &RawElement) -> i32 {
    // Registered names are validated against their declared kind;
    // anything else is stored as opaque bytes.
    if let Some(info) = lookup(record.name) {
        match PropertyValue::decode(info.kind, &record.value) {
            Ok(value) => {
                if let Some(validator) = info.validator {
                    if !validator(&value) {
                        tracing::warn!(name = %record.name, "rejected by validator");
                        return status::UNKNOWN_ERROR;
                    }
                }
            },
            Err(err) => {
                tracing::warn!(name = %record.name, %err, "value does not decode as declared kind");
                return status::UNKNOWN_ERROR;
            },
        }
    }

    match state.store.set(record.name, record.value.clone()) {
        Ok(()) => status::OK,
        Err(err) => {
            tracing::error!(name = %record.name, %err, "store write failed");
            status::NOT_AVAILABLE
        },
    }
}

/// Push change events to a monitor-mode connection until it goes away.
async fn run_monitor(
    exchange: &mut Exchange<'_>,
    mut events: broadcast::Receiver<Value>,
    body: Option<&[u8]>,
) {
    // Body is four zero bytes then a plist wrapping the filter dict.
    // Filters are recorded for diagnostics; this station pushes every
    // change event to every subscriber.
    if let Some(body) = body {
        if body.len() > 4 {
            match Value::parse(&body[4..]) {
                Ok(filters) => tracing::debug!(?filters, "monitor subscription"),
                Err(err) => tracing::warn!(%err, "unparseable monitor filters"),
            }
        }
    }

    exchange.begin_monitoring();

    loop {
        match events.recv().await {
            Ok(event) => {
                let frame = compose_monitor_frame(&event.compose());
                if let Err(err) = exchange.send_raw(&frame).await {
                    tracing::debug!(%err, "monitor subscriber gone");
                    break;
                }
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "monitor subscriber lagged");
            },
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
