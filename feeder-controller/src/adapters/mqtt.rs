use std::time::Duration;

use async_trait::async_trait;
use feeder_tls::ClientIdentity;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, TlsConfiguration};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::MqttConfig;
use crate::error::TransportError;
use crate::event::DeviceEvent;
use crate::ports::Transport;

/// Pause after a failed poll before rumqttc reconnects on the next one.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Capacity of the request channel between the client handle and its
/// event loop.
const REQUEST_CAPACITY: usize = 20;

/// How long shutdown waits for the DISCONNECT to be queued and sent.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// MQTT client over mutual TLS.
#[derive(Clone)]
pub struct MqttTransport {
    client: AsyncClient,
}

impl MqttTransport {
    /// Build the client and its event loop. Nothing connects until the event
    /// loop is polled (see [`spawn_event_loop`]).
    pub fn new(config: &MqttConfig, identity: ClientIdentity) -> (Self, EventLoop) {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        options.set_transport(rumqttc::Transport::tls_with_config(
            TlsConfiguration::Simple {
                ca: identity.ca_pem,
                alpn: None,
                client_auth: Some((identity.cert_pem, identity.key_pem)),
            },
        ));

        Self::with_options(options)
    }

    pub fn with_options(options: MqttOptions) -> (Self, EventLoop) {
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        (Self { client }, eventloop)
    }

    /// Queue a DISCONNECT and let `event_loop` run until it has been sent.
    ///
    /// `cancel` must be the token the event loop was spawned with. It is
    /// only fired when the disconnect is not through within
    /// [`DISCONNECT_TIMEOUT`], for example when the request queue stays full
    /// or the broker is unreachable.
    pub async fn shutdown(&self, mut event_loop: JoinHandle<()>, cancel: &CancellationToken) {
        let deadline = tokio::time::Instant::now() + DISCONNECT_TIMEOUT;

        match tokio::time::timeout_at(deadline, self.client.disconnect()).await {
            Ok(Ok(())) => debug!("MQTT disconnect queued"),
            Ok(Err(e)) => warn!(error = %e, "MQTT disconnect failed"),
            Err(_) => warn!("MQTT request queue full, disconnect not queued"),
        }

        if tokio::time::timeout_at(deadline, &mut event_loop).await.is_err() {
            warn!("MQTT disconnect not sent in time, stopping event loop");
            cancel.cancel();
            let _ = event_loop.await;
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                message: e.to_string(),
            })
    }

    async fn subscribe(&self, filter: &str) -> Result<(), TransportError> {
        self.client
            .subscribe(filter, QoS::AtLeastOnce)
            .await
            .map_err(|e| TransportError::Subscribe {
                filter: filter.to_string(),
                message: e.to_string(),
            })
    }
}

/// Drive the MQTT event loop, forwarding connection changes and inbound
/// messages as [`DeviceEvent`]s until our DISCONNECT has gone out or
/// `cancel` fires.
///
/// Polling continues after the receiver is dropped, so a disconnect queued
/// during shutdown is still sent.
pub fn spawn_event_loop(
    mut eventloop: EventLoop,
    events: mpsc::Sender<DeviceEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut connected = false;

        loop {
            let polled = tokio::select! {
                _ = cancel.cancelled() => break,
                polled = eventloop.poll() => polled,
            };

            let (event, backoff) = match polled {
                Ok(event) if disconnect_sent(&event) => {
                    info!("MQTT disconnect sent");
                    break;
                }
                Ok(event) => (translate(&event), false),
                Err(e) => {
                    error!(error = %e, "MQTT connection error");
                    (Some(DeviceEvent::Disconnected), true)
                }
            };

            if let Some(event) = event {
                // only forward a disconnect when we were connected
                let forward = match event {
                    DeviceEvent::Connected => {
                        connected = true;
                        true
                    }
                    DeviceEvent::Disconnected => std::mem::replace(&mut connected, false),
                    _ => true,
                };
                if forward {
                    debug!(?event, "MQTT event");
                    if events.send(event).await.is_err() {
                        debug!("Event receiver gone, dropping MQTT event");
                    }
                }
            }

            if backoff {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
            }
        }

        info!("MQTT event loop stopped");
    })
}

fn disconnect_sent(event: &Event) -> bool {
    matches!(event, Event::Outgoing(Outgoing::Disconnect))
}

/// Map a raw MQTT event to the device event it represents, if any.
pub fn translate(event: &Event) -> Option<DeviceEvent> {
    match event {
        Event::Incoming(Packet::ConnAck(_)) => Some(DeviceEvent::Connected),
        Event::Incoming(Packet::Disconnect) => Some(DeviceEvent::Disconnected),
        Event::Incoming(Packet::Publish(publish)) => Some(DeviceEvent::MessageReceived {
            topic: publish.topic.clone(),
            payload: publish.payload.to_vec(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, ConnectReturnCode, Publish};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn connack_is_connected() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::Success,
            false,
        )));
        assert_eq!(translate(&event), Some(DeviceEvent::Connected));
    }

    #[test]
    fn publish_carries_topic_and_payload() {
        let event = Event::Incoming(Packet::Publish(Publish::new(
            "feeder/command",
            QoS::AtLeastOnce,
            b"feed".to_vec(),
        )));
        assert_eq!(
            translate(&event),
            Some(DeviceEvent::MessageReceived {
                topic: "feeder/command".to_string(),
                payload: b"feed".to_vec(),
            })
        );
    }

    #[test]
    fn broker_disconnect_is_disconnected() {
        let event = Event::Incoming(Packet::Disconnect);
        assert_eq!(translate(&event), Some(DeviceEvent::Disconnected));
    }

    #[test]
    fn acks_are_ignored() {
        assert_eq!(translate(&Event::Incoming(Packet::PingResp)), None);
        assert_eq!(translate(&Event::Outgoing(Outgoing::PingReq)), None);
    }

    #[test]
    fn only_our_disconnect_ends_the_loop() {
        assert!(disconnect_sent(&Event::Outgoing(Outgoing::Disconnect)));
        assert!(!disconnect_sent(&Event::Incoming(Packet::Disconnect)));
        assert!(!disconnect_sent(&Event::Outgoing(Outgoing::PingReq)));
    }

    /// Accept one client, acknowledge its CONNECT and return the next
    /// fixed header it sends.
    async fn accept_and_read_next_packet(listener: TcpListener) -> [u8; 2] {
        let (mut stream, _) = listener.accept().await.unwrap();

        let mut header = [0u8; 2];
        stream.read_exact(&mut header).await.unwrap();
        assert_eq!(header[0], 0x10, "expected CONNECT");
        let mut body = vec![0u8; usize::from(header[1])];
        stream.read_exact(&mut body).await.unwrap();

        // CONNACK, no session, accepted
        stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();

        let mut next = [0u8; 2];
        stream.read_exact(&mut next).await.unwrap();
        next
    }

    #[tokio::test]
    async fn shutdown_sends_disconnect_before_stopping_the_loop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let broker = tokio::spawn(accept_and_read_next_packet(listener));

        let (transport, eventloop) =
            MqttTransport::with_options(MqttOptions::new("feeder-test", "127.0.0.1", port));
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = spawn_event_loop(eventloop, events_tx, cancel.clone());

        let first = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
            .await
            .unwrap();
        assert_eq!(first, Some(DeviceEvent::Connected));
        drop(events_rx);

        tokio::time::timeout(Duration::from_secs(5), transport.shutdown(handle, &cancel))
            .await
            .unwrap();

        let sent = tokio::time::timeout(Duration::from_secs(5), broker)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sent, [0xE0, 0x00]);
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_with_full_queue_gives_up_after_timeout() {
        let (transport, eventloop) =
            MqttTransport::with_options(MqttOptions::new("feeder-test", "127.0.0.1", 1883));
        for n in 0..REQUEST_CAPACITY {
            transport
                .client
                .try_publish("feeder/backlog", QoS::AtLeastOnce, false, vec![n as u8])
                .unwrap();
        }
        let cancel = CancellationToken::new();
        // an event loop that is never polled and only stops when cancelled
        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                cancel.cancelled().await;
                drop(eventloop);
            }
        });

        let started = tokio::time::Instant::now();
        transport.shutdown(handle, &cancel).await;

        assert!(cancel.is_cancelled());
        let elapsed = started.elapsed();
        assert!(elapsed >= DISCONNECT_TIMEOUT && elapsed < DISCONNECT_TIMEOUT + Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_a_loop_that_finishes_in_time() {
        let (transport, eventloop) =
            MqttTransport::with_options(MqttOptions::new("feeder-test", "127.0.0.1", 1883));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            drop(eventloop);
        });

        let started = tokio::time::Instant::now();
        transport.shutdown(handle, &cancel).await;

        assert!(!cancel.is_cancelled());
        assert!(started.elapsed() < DISCONNECT_TIMEOUT);
    }
}
