/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Request/response correlation over a pair of message ports.
//!
//! Each side of a port pair opens a [`MessageChannel`]. Outbound calls are
//! parked under their unique message name until the reply with that name comes
//! back. Inbound calls are handed to a [`MessageHandler`], each on its own task,
//! so slow calls never hold up replies or other calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use animsync_types::Transferable;
use async_trait::async_trait;
use log::{debug, error, warn};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{ChannelError, DispatchError};
use crate::messages::{Direction, Message, Method, Packet, Payload};

/// One end of a bidirectional, unbounded, in-order packet pipe.
#[derive(Debug)]
pub struct Port {
    outbound: mpsc::UnboundedSender<Packet>,
    inbound: mpsc::UnboundedReceiver<Packet>,
}

/// Creates two connected ports. Nothing but packets crosses between them.
pub fn port_pair() -> (Port, Port) {
    let (left_tx, right_rx) = mpsc::unbounded_channel();
    let (right_tx, left_rx) = mpsc::unbounded_channel();
    (
        Port {
            outbound: left_tx,
            inbound: left_rx,
        },
        Port {
            outbound: right_tx,
            inbound: right_rx,
        },
    )
}

/// Serves the calls that arrive on a channel.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Produces the reply body for `message`. `channel` is the channel the
    /// call arrived on, for handlers that call back into the peer.
    async fn handle(
        &self,
        channel: &MessageChannel,
        message: Message,
    ) -> Result<Payload, DispatchError>;
}

/// Rejects every inbound call. For endpoints that only ever call out.
#[derive(Debug, Default)]
pub struct Unhandled;

#[async_trait]
impl MessageHandler for Unhandled {
    async fn handle(
        &self,
        _channel: &MessageChannel,
        message: Message,
    ) -> Result<Payload, DispatchError> {
        Err(DispatchError::Unsupported {
            method: message.method()?.as_str(),
        })
    }
}

struct Shared {
    outbound: Mutex<Option<mpsc::UnboundedSender<Packet>>>,
    pending: Mutex<HashMap<String, oneshot::Sender<Message>>>,
}

/// A cloneable endpoint of an open port.
#[derive(Clone)]
pub struct MessageChannel {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for MessageChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageChannel")
            .field("closed", &self.is_closed())
            .field("pending", &self.pending_calls())
            .finish()
    }
}

impl MessageChannel {
    /// Starts reading `port` on the current runtime. The returned task ends
    /// once the peer hangs up or either side closes.
    pub fn open(port: Port, handler: Arc<dyn MessageHandler>) -> (Self, JoinHandle<()>) {
        let Port { outbound, inbound } = port;
        let channel = Self {
            shared: Arc::new(Shared {
                outbound: Mutex::new(Some(outbound)),
                pending: Mutex::new(HashMap::new()),
            }),
        };
        let task = tokio::spawn(read_loop(channel.clone(), inbound, handler));
        (channel, task)
    }

    /// Sends a call and waits for its reply. There is no timeout; the call
    /// only fails early if the channel closes.
    pub async fn call(
        &self,
        method: Method,
        args: Vec<Value>,
        transfer: Vec<Transferable>,
    ) -> Result<Payload, ChannelError> {
        let name = method.call_name();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending().insert(name.clone(), reply_tx);

        if let Err(err) = self.send(Message::call(name.clone(), args, transfer)) {
            self.pending().remove(&name);
            return Err(err);
        }
        debug!("-> {name}");

        let reply = reply_rx.await.map_err(|_| ChannelError::Closed)?;
        if let Some(message) = reply.error {
            return Err(ChannelError::Remote { name, message });
        }
        Ok(Payload {
            args: reply.args,
            transfer: reply.transfer,
        })
    }

    /// Sends a call that gets no reply.
    pub fn notify(&self, method: Method, args: Vec<Value>) -> Result<(), ChannelError> {
        let mut message = Message::call(method.call_name(), args, Vec::new());
        message.direction = Direction::Notify;
        self.send(message)
    }

    /// Hangs up. Outstanding calls fail with [`ChannelError::Closed`] and the
    /// peer's read loop ends.
    pub fn close(&self) {
        let outbound = self.outbound().take();
        if outbound.is_some() {
            debug!("closing message channel");
        }
        // Dropping the reply senders wakes every waiting caller.
        self.pending().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.outbound().is_none()
    }

    pub fn pending_calls(&self) -> usize {
        self.pending().len()
    }

    fn send(&self, message: Message) -> Result<(), ChannelError> {
        let packet = message.encode()?;
        match self.outbound().as_ref() {
            Some(outbound) => outbound.send(packet).map_err(|_| ChannelError::Closed),
            None => Err(ChannelError::Closed),
        }
    }

    fn resolve(&self, reply: Message) {
        let Some(waiting) = self.pending().remove(&reply.name) else {
            warn!("reply {} matches no outstanding call", reply.name);
            return;
        };
        debug!("<- {}", reply.name);
        // The caller may have given up; nothing to do then.
        let _ = waiting.send(reply);
    }

    async fn serve(&self, handler: &dyn MessageHandler, message: Message) {
        let name = message.name.clone();
        let direction = message.direction;
        let reply = match handler.handle(self, message).await {
            Ok(payload) => Message::reply(name, payload),
            Err(err) => {
                error!("{name} rejected: {err}");
                Message::failure(name, err.to_string())
            }
        };
        if direction == Direction::Notify {
            return;
        }
        if let Err(err) = self.send(reply) {
            debug!("reply dropped: {err}");
        }
    }

    fn outbound(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Packet>>> {
        self.shared
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<Message>>> {
        self.shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

async fn read_loop(
    channel: MessageChannel,
    mut inbound: mpsc::UnboundedReceiver<Packet>,
    handler: Arc<dyn MessageHandler>,
) {
    while let Some(packet) = inbound.recv().await {
        let message = match Message::decode(packet) {
            Ok(message) => message,
            Err(err) => {
                error!("dropping undecodable message: {err}");
                continue;
            }
        };
        match message.direction {
            Direction::Reply => channel.resolve(message),
            Direction::Call | Direction::Notify => {
                let channel = channel.clone();
                let handler = handler.clone();
                tokio::spawn(async move { channel.serve(handler.as_ref(), message).await });
            }
        }
    }
    debug!("peer hung up");
    channel.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{FileMethod, ViewMethod};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Echoes arguments after sleeping for the number of milliseconds in the
    /// last argument. Moves a transferred buffer back as its length.
    #[derive(Default)]
    struct Echo {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MessageHandler for Echo {
        async fn handle(
            &self,
            _channel: &MessageChannel,
            mut message: Message,
        ) -> Result<Payload, DispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if message.method()? == Method::View(ViewMethod::Destroy) {
                return Err(DispatchError::NotInitialized);
            }
            if let Some(delay) = message.args.last().and_then(Value::as_u64) {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            let mut args = message.args;
            if let Some(buffer) = message.transfer.pop().and_then(Transferable::into_buffer) {
                args.push(json!(buffer.len()));
            }
            Ok(Payload::new(args))
        }
    }

    fn connect(handler: Arc<dyn MessageHandler>) -> (MessageChannel, MessageChannel) {
        let (left, right) = port_pair();
        let (client, _) = MessageChannel::open(left, Arc::new(Unhandled));
        let (server, _) = MessageChannel::open(right, handler);
        (client, server)
    }

    #[tokio::test]
    async fn reply_resolves_the_matching_call() {
        let (client, _server) = connect(Arc::new(Echo::default()));
        let reply = client
            .call(
                Method::File(FileMethod::Load),
                vec![json!("clip")],
                vec![Transferable::Buffer(vec![0; 12])],
            )
            .await
            .unwrap();
        assert_eq!(reply.args, vec![json!("clip"), json!(12)]);
        assert_eq!(client.pending_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_calls_complete_out_of_order() {
        let (client, _server) = connect(Arc::new(Echo::default()));
        let slow = client.call(Method::View(ViewMethod::Play), vec![json!(30)], vec![]);
        let fast = client.call(Method::View(ViewMethod::Play), vec![json!(5)], vec![]);

        let (slow, fast) = tokio::join!(slow, fast);
        assert_eq!(slow.unwrap().args, vec![json!(30)]);
        assert_eq!(fast.unwrap().args, vec![json!(5)]);
    }

    #[tokio::test]
    async fn handler_errors_reach_the_caller() {
        let (client, _server) = connect(Arc::new(Echo::default()));
        let err = client
            .call(Method::View(ViewMethod::Destroy), vec![], vec![])
            .await
            .unwrap_err();
        match err {
            ChannelError::Remote { name, message } => {
                assert!(name.starts_with("View.destroy_"));
                assert!(message.contains("not initialized"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn calls_into_an_unhandled_endpoint_are_rejected() {
        let (client, server) = connect(Arc::new(Echo::default()));
        let err = server
            .call(Method::File(FileMethod::Width), vec![], vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Remote { .. }));
        assert!(!client.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn notify_runs_handler_without_reply() {
        let echo = Arc::new(Echo::default());
        let (client, _server) = connect(echo.clone());
        client
            .notify(Method::View(ViewMethod::Pause), vec![json!(1)])
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(echo.calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.pending_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_fails_outstanding_calls_and_stops_peer() {
        let (left, right) = port_pair();
        let (client, client_task) = MessageChannel::open(left, Arc::new(Unhandled));
        let (_server, server_task) = MessageChannel::open(right, Arc::new(Echo::default()));

        let waiting = {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .call(Method::View(ViewMethod::Flush), vec![json!(10_000)], vec![])
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(client.pending_calls(), 1);

        client.close();
        assert!(matches!(waiting.await.unwrap(), Err(ChannelError::Closed)));
        server_task.await.unwrap();
        client_task.await.unwrap();

        let late = client.call(Method::View(ViewMethod::Play), vec![], vec![]).await;
        assert!(matches!(late, Err(ChannelError::Closed)));
    }
}
