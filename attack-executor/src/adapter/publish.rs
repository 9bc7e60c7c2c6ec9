use crate::{ErrorKind, Exchange, ProtocolAdapter, Registry, SendError};
use async_trait::async_trait;
use barrage_target::{Destination, Target};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures_util::SinkExt;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

type Connection = Arc<Mutex<Framed<TcpStream, LengthDelimitedCodec>>>;

/// Frame body: `u16` topic length, topic, `i32` partition, payload. Every frame is sent with a
/// `u32` length prefix.
pub fn encode_frame(destination: &Destination, payload: &[u8]) -> Result<Bytes, SendError> {
    let topic = destination.topic.as_bytes();
    let topic_len = u16::try_from(topic.len()).map_err(|_| {
        SendError::new(
            ErrorKind::Protocol,
            format!("topic of {} bytes is too long", topic.len()),
        )
    })?;
    let mut frame = BytesMut::with_capacity(2 + topic.len() + 4 + payload.len());
    frame.put_u16(topic_len);
    frame.put_slice(topic);
    frame.put_i32(destination.partition);
    frame.put_slice(payload);
    Ok(frame.freeze())
}

/// Split a frame body back into topic, partition and payload
pub fn decode_frame(mut frame: Bytes) -> Option<(String, i32, Bytes)> {
    if frame.remaining() < 2 {
        return None;
    }
    let topic_len = frame.get_u16() as usize;
    if frame.remaining() < topic_len + 4 {
        return None;
    }
    let topic = String::from_utf8(frame.split_to(topic_len).to_vec()).ok()?;
    let partition = frame.get_i32();
    Some((topic, partition, frame))
}

/// Publishes to one destination over the connection of its host
#[derive(Clone)]
struct Publisher {
    destination: Destination,
    connection: Connection,
}

impl Publisher {
    async fn publish(&self, payload: &Bytes) -> Result<u64, SendError> {
        let frame = encode_frame(&self.destination, payload)?;
        let mut connection = self.connection.lock().await;
        connection.send(frame).await?;
        Ok(payload.len() as u64)
    }
}

/// Fire and forget message publishing.
///
/// Connections are opened lazily, one per broker host, and shared by the publishers of every
/// topic/partition on that host. A connection that fails to open is retried on the next send,
/// a connection that breaks is dropped and reopened.
pub struct PublishAdapter {
    connections: Registry<String, Connection>,
    publishers: Registry<Destination, Publisher>,
    connect_timeout: Duration,
    send_timeout: Duration,
}

impl PublishAdapter {
    pub fn new(connect_timeout: Duration, send_timeout: Duration) -> Self {
        PublishAdapter {
            connections: Registry::new(),
            publishers: Registry::new(),
            connect_timeout,
            send_timeout,
        }
    }

    /// Number of open broker connections
    pub async fn connection_count(&self) -> usize {
        self.connections.len().await
    }

    pub async fn publisher_count(&self) -> usize {
        self.publishers.len().await
    }

    async fn connection(&self, host: &str) -> Result<Connection, SendError> {
        let key = host.to_string();
        self.connections
            .get_or_try_init(&key, || async {
                debug!("[PublishAdapter] - connecting to {}", host);
                let stream = timeout(self.connect_timeout, TcpStream::connect(host))
                    .await
                    .map_err(|_| SendError::timeout(self.connect_timeout))?
                    .map_err(|e| {
                        warn!("[PublishAdapter] - failed to connect to {}: {}", host, e);
                        let mut err = SendError::from(e);
                        if err.kind == ErrorKind::Io {
                            err.kind = ErrorKind::Connect;
                        }
                        err
                    })?;
                let _ = stream.set_nodelay(true);
                Ok::<_, SendError>(Arc::new(Mutex::new(Framed::new(
                    stream,
                    LengthDelimitedCodec::new(),
                ))))
            })
            .await
    }

    async fn publisher(&self, destination: &Destination) -> Result<Publisher, SendError> {
        self.publishers
            .get_or_try_init(destination, || async {
                let connection = self.connection(&destination.host).await?;
                debug!("[PublishAdapter] - new publisher for {}", destination);
                Ok::<_, SendError>(Publisher {
                    destination: destination.clone(),
                    connection,
                })
            })
            .await
    }

    /// Forget a broken connection and the publisher holding it
    async fn evict(&self, publisher: &Publisher) {
        let dest = &publisher.destination;
        self.publishers
            .remove_if(dest, |p| Arc::ptr_eq(&p.connection, &publisher.connection))
            .await;
        if self
            .connections
            .remove_if(&dest.host, |c| Arc::ptr_eq(c, &publisher.connection))
            .await
        {
            debug!("[PublishAdapter] - dropped connection to {}", &dest.host);
        }
    }
}

#[async_trait]
impl ProtocolAdapter for PublishAdapter {
    async fn transport(&self, target: &Target) -> Result<Exchange, SendError> {
        let destination = target.destination().ok_or_else(|| {
            SendError::new(ErrorKind::Other, format!("{} has no publish destination", target))
        })?;
        let publisher = self.publisher(destination).await?;
        let result = match timeout(self.send_timeout, publisher.publish(target.payload())).await {
            Ok(result) => result,
            Err(_) => Err(SendError::timeout(self.send_timeout)),
        };
        match result {
            Ok(bytes_out) => Ok(Exchange {
                bytes_out,
                bytes_in: 0,
            }),
            Err(e) => {
                if e.kind != ErrorKind::Protocol {
                    self.evict(&publisher).await;
                }
                Err(e)
            }
        }
    }
}
