//! Gateway messages and the traits used to pull and push them.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};
use tokio::sync::mpsc;

use crate::domain::errors::AdapterError;
use crate::AnyResult;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr)]
pub enum MessageKind {
    #[strum(serialize = "http.request")]
    Request,
    #[strum(serialize = "http.disconnect")]
    Disconnect,
    #[strum(serialize = "http.response.start")]
    ResponseStart,
    #[strum(serialize = "http.response.body")]
    ResponseBody,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// A message pulled from the gateway while reading the request body.
///
/// `kind` stays a plain string so that unknown message types reach the
/// reader and can be rejected there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub body: Bytes,
    #[serde(default)]
    pub more_body: bool,
}

impl ReceiveMessage {
    /// An `http.request` body chunk.
    pub fn chunk(body: impl Into<Bytes>, more_body: bool) -> Self {
        Self {
            kind: MessageKind::Request.as_str().to_owned(),
            body: body.into(),
            more_body,
        }
    }

    pub fn disconnect() -> Self {
        Self {
            kind: MessageKind::Disconnect.as_str().to_owned(),
            body: Bytes::new(),
            more_body: false,
        }
    }

    pub fn is(&self, kind: MessageKind) -> bool {
        self.kind == kind.as_str()
    }
}

/// A message pushed to the gateway while rendering a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum SendMessage {
    #[serde(rename = "http.response.start")]
    ResponseStart {
        status: u16,
        headers: Vec<(Bytes, Bytes)>,
    },
    #[serde(rename = "http.response.body")]
    ResponseBody { body: Bytes },
}

impl SendMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            SendMessage::ResponseStart { .. } => MessageKind::ResponseStart,
            SendMessage::ResponseBody { .. } => MessageKind::ResponseBody,
        }
    }
}

/// The gateway's `receive` side.
pub trait Receive {
    fn receive(&mut self) -> impl Future<Output = AnyResult<ReceiveMessage>>;
}

/// The gateway's `send` side.
pub trait Transmit {
    fn transmit(&mut self, message: SendMessage) -> impl Future<Output = AnyResult<()>>;
}

/// Receiver for requests built without a gateway; every call fails.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoReceive;

impl Receive for NoReceive {
    async fn receive(&mut self) -> AnyResult<ReceiveMessage> {
        Err(AdapterError::NoReceiver.into())
    }
}

impl Receive for mpsc::Receiver<ReceiveMessage> {
    async fn receive(&mut self) -> AnyResult<ReceiveMessage> {
        self.recv()
            .await
            .ok_or_else(|| AdapterError::Disconnected.into())
    }
}

impl Receive for VecDeque<ReceiveMessage> {
    async fn receive(&mut self) -> AnyResult<ReceiveMessage> {
        self.pop_front()
            .ok_or_else(|| AdapterError::Disconnected.into())
    }
}

/// Adapts an async closure into a [`Receive`].
pub struct FnReceive<F>(pub F);

impl<F, Fut> Receive for FnReceive<F>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AnyResult<ReceiveMessage>>,
{
    fn receive(&mut self) -> impl Future<Output = AnyResult<ReceiveMessage>> {
        (self.0)()
    }
}

impl<F> fmt::Debug for FnReceive<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnReceive").finish_non_exhaustive()
    }
}

impl Transmit for mpsc::Sender<SendMessage> {
    async fn transmit(&mut self, message: SendMessage) -> AnyResult<()> {
        self.send(message)
            .await
            .map_err(|_| AdapterError::Disconnected.into())
    }
}

/// Collects every message; handy for inspecting a rendered response.
impl Transmit for Vec<SendMessage> {
    async fn transmit(&mut self, message: SendMessage) -> AnyResult<()> {
        self.push(message);
        Ok(())
    }
}

/// Adapts an async closure into a [`Transmit`].
pub struct FnTransmit<F>(pub F);

impl<F, Fut> Transmit for FnTransmit<F>
where
    F: FnMut(SendMessage) -> Fut,
    Fut: Future<Output = AnyResult<()>>,
{
    fn transmit(&mut self, message: SendMessage) -> impl Future<Output = AnyResult<()>> {
        (self.0)(message)
    }
}

impl<F> fmt::Debug for FnTransmit<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransmit").finish_non_exhaustive()
    }
}
