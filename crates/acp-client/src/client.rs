//! The client facade.
//!
//! One [`Client`] manages one station: it owns the session, runs each
//! operation as a queued exchange, and tracks whether session encryption
//! is active so message keys are built correctly (obfuscated password
//! before authentication, zeros after).

use std::time::Duration;

use acp_proto::{
    Command, Message, Value,
    monitor::{MONITOR_HEADER_SIZE, MonitorFrameHeader, compose_monitor_body},
    payloads::rpc::{RpcRequest, RpcResponse},
    property::{
        ELEMENT_HEADER_SIZE, ElementHeader, PropName, Property, PropertyError, PropertyValue,
        RawElement, compose_element_list, parse_element_list,
    },
};
use acp_session::{DEFAULT_TIMEOUT, Exchange, Session, SessionError};
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::{auth, error::ClientError};

/// Port stations listen on.
pub const DEFAULT_PORT: u16 = 5009;

/// Flag bits observed on property requests from the reference client.
const PROPERTY_FLAGS: i32 = 4;

/// Firmware writes take a while to acknowledge.
const FLASH_TIMEOUT: Duration = Duration::from_secs(120);

/// Idle re-arm interval of the monitor pump; timeouts just loop.
const MONITOR_POLL: Duration = Duration::from_secs(60);

/// Outcome of one requested property when errors are surfaced per entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyReply {
    /// The station returned value bytes.
    Value(Property),
    /// The station returned a status code for this name.
    Error {
        /// Requested property name.
        name: PropName,
        /// Status code (see [`acp_proto::status`]).
        code: i32,
    },
}

/// Per-property record of a set response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetStatus {
    /// Property name the record answers.
    pub name: PropName,
    /// Zero on success, a status code otherwise.
    pub code: i32,
}

/// High-level ACP client.
pub struct Client {
    host: String,
    port: u16,
    password: String,
    session: Option<Session>,
    encrypted: bool,
}

impl Client {
    /// Client for `host` on the default port.
    #[must_use]
    pub fn new(host: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            password: password.into(),
            session: None,
            encrypted: false,
        }
    }

    /// Override the TCP port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Dial the station.
    pub async fn connect(&mut self, timeout: Duration) -> Result<(), ClientError> {
        let session = Session::connect(&self.host, self.port, timeout).await?;
        self.session = Some(session);
        self.encrypted = false;
        Ok(())
    }

    /// Close the connection. Pending exchanges abort with
    /// [`SessionError::Canceled`].
    pub async fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
        self.encrypted = false;
    }

    fn session(&self) -> Result<&Session, ClientError> {
        self.session.as_ref().ok_or(ClientError::Session(SessionError::NotConnected))
    }

    /// Header password argument: the cleartext password until encryption
    /// is active, zeros afterwards.
    fn password_arg(&self) -> Option<&str> {
        if self.encrypted { None } else { Some(&self.password) }
    }

    /// Prove the password over SRP and switch the session to encrypted
    /// operation.
    pub async fn authenticate(&mut self) -> Result<(), ClientError> {
        let session = self.session()?.clone();
        let mut exchange = session.queue().await?;
        auth::authenticate(&mut exchange, &self.password).await?;
        drop(exchange);
        self.encrypted = true;
        Ok(())
    }

    /// Read one property.
    pub async fn get_property(&mut self, name: &str) -> Result<Property, ClientError> {
        let mut properties = self.get_properties(&[name]).await?;
        properties.pop().ok_or(ClientError::InvalidResponse("empty property response"))
    }

    /// Read properties, failing on the first per-property error. The
    /// element stream is always drained to the sentinel so the session
    /// stays aligned.
    pub async fn get_properties(&mut self, names: &[&str]) -> Result<Vec<Property>, ClientError> {
        let replies = self.get_properties_with_errors(names).await?;

        let mut properties = Vec::with_capacity(replies.len());
        let mut first_error = None;
        for reply in replies {
            match reply {
                PropertyReply::Value(property) => properties.push(property),
                PropertyReply::Error { code, .. } => {
                    first_error.get_or_insert(code);
                },
            }
        }
        match first_error {
            Some(code) => Err(PropertyError::ServerError(code).into()),
            None => Ok(properties),
        }
    }

    /// Read properties, returning mixed value/error entries in request
    /// order.
    pub async fn get_properties_with_errors(
        &mut self,
        names: &[&str],
    ) -> Result<Vec<PropertyReply>, ClientError> {
        let mut requests = Vec::with_capacity(names.len());
        for name in names {
            requests.push(Property::request(PropName::new(name)?));
        }
        let payload = compose_element_list(&requests);

        let session = self.session()?.clone();
        let mut exchange = session.queue().await?;

        let request = Message::get_property(self.password_arg(), PROPERTY_FLAGS, payload);
        exchange.send(&request).await?;

        let reply = exchange.receive_message().await?;
        check_reply(Command::GetProperty, &reply)?;

        let elements = read_elements(&mut exchange, &reply).await?;
        Ok(elements
            .into_iter()
            .map(|element| match element.error_code() {
                Some(code) => PropertyReply::Error { name: element.name, code },
                None => PropertyReply::Value(element.into_property()),
            })
            .collect())
    }

    /// Write properties, failing if any per-property record reports an
    /// error.
    pub async fn set_properties(&mut self, properties: &[Property]) -> Result<(), ClientError> {
        let records = self.set_properties_with_status(properties).await?;
        if let Some(record) = records.iter().find(|record| record.code != 0) {
            return Err(PropertyError::ServerError(record.code).into());
        }
        Ok(())
    }

    /// Write properties and return every per-property record.
    pub async fn set_properties_with_status(
        &mut self,
        properties: &[Property],
    ) -> Result<Vec<SetStatus>, ClientError> {
        let payload = compose_element_list(properties);

        let session = self.session()?.clone();
        let mut exchange = session.queue().await?;

        let request = Message::set_property(self.password_arg(), PROPERTY_FLAGS, payload);
        exchange.send(&request).await?;

        let reply = exchange.receive_message().await?;
        check_reply(Command::SetProperty, &reply)?;

        let elements = read_elements(&mut exchange, &reply).await?;
        elements
            .into_iter()
            .map(|element| {
                let code = match element.error_code() {
                    Some(code) => code,
                    None if element.value.len() == 4 => {
                        let mut buf = [0u8; 4];
                        buf.copy_from_slice(&element.value);
                        i32::from_be_bytes(buf)
                    },
                    None => {
                        return Err(ClientError::InvalidResponse(
                            "set response record is not a status code",
                        ));
                    },
                };
                Ok(SetStatus { name: element.name, code })
            })
            .collect()
    }

    /// Subscribe to change events. On success the session is dedicated to
    /// the event stream: further exchanges on this client fail, and
    /// dropping the receiver closes the connection.
    pub async fn monitor(
        &mut self,
        filters: Value,
    ) -> Result<mpsc::Receiver<Value>, ClientError> {
        let session = self.session()?.clone();
        let request =
            Message::monitor(self.password_arg(), 0, compose_monitor_body(&filters));

        let (event_tx, event_rx) = mpsc::channel(32);
        let (ready_tx, ready_rx) = oneshot::channel();

        tokio::spawn(async move {
            let subscribed = subscribe(&session, &request).await;
            match subscribed {
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                },
                Ok(mut exchange) => {
                    let _ = ready_tx.send(Ok(()));
                    pump_events(&mut exchange, &event_tx).await;
                    drop(exchange);
                    session.close().await;
                },
            }
        });

        ready_rx.await.map_err(|_| ClientError::Session(SessionError::Canceled))??;
        Ok(event_rx)
    }

    /// Remote procedure call; returns the outputs dictionary.
    pub async fn rpc(&mut self, function: &str, inputs: Value) -> Result<Value, ClientError> {
        let body = RpcRequest { function: function.to_owned(), inputs }.encode();

        let session = self.session()?.clone();
        let mut exchange = session.queue().await?;
        exchange.send(&Message::rpc(self.password_arg(), body)).await?;

        let reply = exchange.receive_message().await?;
        check_reply(Command::Rpc, &reply)?;

        let body =
            reply.body.as_deref().ok_or(ClientError::InvalidResponse("rpc reply has no body"))?;
        let response = RpcResponse::decode(body)
            .map_err(|_| ClientError::InvalidResponse("rpc reply body shape"))?;

        if response.status != 0 {
            return Err(ClientError::RpcFailed(response.status));
        }
        Ok(response.outputs)
    }

    /// Read the station's capability list.
    pub async fn get_features(&mut self) -> Result<Value, ClientError> {
        let session = self.session()?.clone();
        let mut exchange = session.queue().await?;
        exchange.send(&Message::get_features()).await?;

        let reply = exchange.receive_message().await?;
        check_reply(Command::GetFeatures, &reply)?;

        let body = reply
            .body
            .as_deref()
            .ok_or(ClientError::InvalidResponse("features reply has no body"))?;
        Ok(Value::parse(body)?)
    }

    /// Fetch and format the station's log buffer.
    pub async fn get_logs(&mut self) -> Result<String, ClientError> {
        let property = self.get_property("logm").await?;
        match property.decode()? {
            PropertyValue::Log(text) => Ok(text),
            other => {
                Err(ClientError::Property(PropertyError::InvalidValue {
                    kind: other.kind(),
                    value: property.value.to_vec(),
                }))
            },
        }
    }

    /// Reboot the station by writing the reboot trigger property.
    pub async fn reboot(&mut self) -> Result<(), ClientError> {
        let trigger = Property::typed(PropName::new("acRB")?, &PropertyValue::Dec(0));
        self.set_properties(&[trigger]).await
    }

    /// Write a firmware image to the primary partition. The response body
    /// is station-specific and returned opaque.
    pub async fn flash_primary(&mut self, image: Bytes) -> Result<Bytes, ClientError> {
        let session = self.session()?.clone();
        let mut exchange = session.queue().await?;
        exchange.send(&Message::flash_primary(self.password_arg(), image)).await?;

        let reply = exchange.receive_message_timeout(FLASH_TIMEOUT).await?;
        check_reply(Command::FlashPrimary, &reply)?;
        Ok(reply.body.unwrap_or_else(Bytes::new))
    }

    /// Round-trip probe: the station reflects the payload back.
    pub async fn echo(&mut self, payload: Bytes) -> Result<Bytes, ClientError> {
        let session = self.session()?.clone();
        let mut exchange = session.queue().await?;
        exchange.send(&Message::echo(self.password_arg(), payload)).await?;

        let reply = exchange.receive_message().await?;
        check_reply(Command::Echo, &reply)?;
        Ok(reply.body.unwrap_or_else(Bytes::new))
    }
}

fn check_reply(expected: Command, reply: &Message) -> Result<(), ClientError> {
    if reply.command != expected {
        return Err(ClientError::UnexpectedCommand { expected, got: reply.command });
    }
    if reply.error_code != 0 {
        return Err(ClientError::ErrorCode(reply.error_code));
    }
    Ok(())
}

/// Collect the property elements of a get/set response.
///
/// Stations answer in one of two shapes: a single message whose body is
/// the element run, or a bare acknowledgement followed by raw elements
/// streamed on the connection. Both end with the sentinel.
async fn read_elements(
    exchange: &mut Exchange<'_>,
    reply: &Message,
) -> Result<Vec<RawElement>, ClientError> {
    if let Some(body) = reply.body.as_deref() {
        if !body.is_empty() {
            return Ok(parse_element_list(body)?);
        }
    }

    let mut elements = Vec::new();
    loop {
        let header_bytes = exchange.receive(ELEMENT_HEADER_SIZE, DEFAULT_TIMEOUT).await?;
        let header = ElementHeader::parse(&header_bytes)?;

        if header.is_sentinel() {
            exchange.receive(header.sentinel_pad(), DEFAULT_TIMEOUT).await?;
            return Ok(elements);
        }

        let value = exchange.receive(header.size as usize, DEFAULT_TIMEOUT).await?;
        elements.push(RawElement { name: header.name, flags: header.flags, value });
    }
}

/// Send the subscription request and switch the exchange to monitor mode.
async fn subscribe<'a>(
    session: &'a Session,
    request: &Message,
) -> Result<Exchange<'a>, ClientError> {
    let mut exchange = session.queue().await?;
    exchange.send(request).await?;

    let ack = exchange.receive_message().await?;
    check_reply(Command::Monitor, &ack)?;

    exchange.begin_monitoring();
    Ok(exchange)
}

/// Forward event frames to the consumer until the stream or the consumer
/// goes away.
async fn pump_events(exchange: &mut Exchange<'_>, events: &mpsc::Sender<Value>) {
    loop {
        let header_bytes = match exchange.receive(MONITOR_HEADER_SIZE, MONITOR_POLL).await {
            Ok(bytes) => bytes,
            Err(SessionError::Timeout) => continue,
            Err(err) => {
                tracing::debug!(%err, "monitor stream ended");
                return;
            },
        };

        let header = match MonitorFrameHeader::parse(&header_bytes) {
            Ok(header) => header,
            Err(err) => {
                tracing::warn!(%err, "malformed monitor frame header");
                return;
            },
        };

        let body = match exchange.receive(header.body_size as usize, DEFAULT_TIMEOUT).await {
            Ok(body) => body,
            Err(err) => {
                tracing::debug!(%err, "monitor stream ended mid-frame");
                return;
            },
        };

        let event = match Value::parse(&body) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(%err, "malformed monitor event body");
                return;
            },
        };

        if events.send(event).await.is_err() {
            tracing::debug!("monitor consumer dropped; closing session");
            return;
        }
    }
}
