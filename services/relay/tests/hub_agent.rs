//! End-to-end tests for the hub and agent roles and the broker pumps

use std::time::Duration;

use chrono::Utc;
use fleet_broker::Broker;
use fleet_codec::Envelope;
use fleet_config::{BrokerConfig, BusConfig, HeartbeatConfig, ReconnectConfig, WireConfig};
use fleet_network::{ConnectionState, WireClient, WireServer};
use fleet_relay::{ingest, uplink, Agent, Hub};
use fleet_types::{topics, ConsoleLogMessage, WorkerStatus};
use futures::StreamExt;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(3);

fn hub_config() -> BusConfig {
    BusConfig {
        wire: WireConfig {
            port: 0,
            ..WireConfig::default()
        },
        ..BusConfig::default()
    }
}

fn agent_config(port: u16, heartbeat: bool) -> BusConfig {
    BusConfig {
        wire: WireConfig {
            port,
            ..WireConfig::default()
        },
        reconnect: ReconnectConfig {
            initial_delay_ms: 20,
            max_delay_ms: 100,
            multiplier: 2.0,
        },
        heartbeat: HeartbeatConfig {
            enabled: heartbeat,
            interval_ms: 50,
            service_name: "test-agent".into(),
        },
        ..BusConfig::default()
    }
}

fn console_line(name: &str) -> ConsoleLogMessage {
    ConsoleLogMessage {
        name: name.into(),
        pid: 42,
        is_healthy: true,
        details: Some("started".into()),
        timestamp: Utc::now(),
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_hub_forwards_broker_channels_to_agent() {
    let hub = Hub::new(&hub_config()).unwrap();
    let addr = hub.start().await.unwrap();

    let agent = Agent::new(&agent_config(addr.port(), false)).unwrap();
    let mut messages = agent.client().messages();
    agent.start();
    wait_until(|| hub.server().connection_count() == 1).await;

    // Not a forwarded channel
    hub.broker().push("internal", &1u32).unwrap();
    hub.broker().push(topics::CONSOLE_LOG, &console_line("worker-1")).unwrap();

    let first = timeout(WAIT, messages.recv()).await.unwrap().unwrap();
    assert_eq!(first.topic, topics::CONSOLE_LOG);
    assert_eq!(first.payload_type, "ConsoleLogMessage");
    assert_eq!(first.decode_payload::<ConsoleLogMessage>().unwrap().name, "worker-1");

    hub.broker().push(topics::SERVICE_STATUS, &"ok").unwrap();
    let second = timeout(WAIT, messages.recv()).await.unwrap().unwrap();
    assert_eq!(second.topic, topics::SERVICE_STATUS);
    assert!(hub.server().history().iter().all(|e| e.topic != "internal"));

    agent.shutdown().await;
    hub.shutdown().await;
}

#[tokio::test]
async fn test_agent_heartbeat_reaches_hub() {
    let hub = Hub::new(&hub_config()).unwrap();
    let addr = hub.start().await.unwrap();
    let mut inbound = hub.server().inbound();

    let agent = Agent::new(&agent_config(addr.port(), true)).unwrap();
    agent.start();

    let beat = timeout(WAIT, inbound.recv()).await.unwrap().unwrap();
    assert_eq!(beat.topic, topics::HOST_HEARTBEAT);
    let status: WorkerStatus = beat.decode_payload().unwrap();
    assert_eq!(status.service_name, "test-agent");
    assert_eq!(status.process_id, std::process::id());
    assert!(status.uptime_seconds.is_some());

    agent.shutdown().await;
    assert!(agent.client().is_closed());
    hub.shutdown().await;
}

#[tokio::test]
async fn test_peer_traffic_is_not_pushed_into_hub_broker() {
    let hub = Hub::new(&hub_config()).unwrap();
    let addr = hub.start().await.unwrap();
    let mut inbound = hub.server().inbound();

    let client = WireClient::new(WireConfig {
        port: addr.port(),
        ..WireConfig::default()
    })
    .unwrap();
    client.connect().await.unwrap();
    client.send_value(topics::CONSOLE_LOG, &console_line("remote")).unwrap();

    timeout(WAIT, inbound.recv()).await.unwrap().unwrap();
    assert!(hub.broker().history(topics::CONSOLE_LOG).is_empty());
    assert_eq!(hub.server().history().len(), 1);

    client.close();
    hub.shutdown().await;
}

#[tokio::test]
async fn test_ingest_pushes_received_envelopes_into_broker() {
    let server = WireServer::new(WireConfig {
        port: 0,
        ..WireConfig::default()
    })
    .unwrap();
    let addr = server.start().await.unwrap();
    let broker = Broker::new(BrokerConfig::default()).unwrap();
    let mut statuses = broker.subscribe_typed::<String>(topics::SERVICE_STATUS);

    let client = WireClient::new(WireConfig {
        port: addr.port(),
        ..WireConfig::default()
    })
    .unwrap();
    let cancel = CancellationToken::new();
    let pump = ingest(&client, &broker, cancel.clone());
    client.connect().await.unwrap();
    wait_until(|| server.connection_count() == 1).await;

    server.broadcast(Envelope::from_value(topics::SERVICE_STATUS, &"degraded").unwrap());
    let received = timeout(WAIT, statuses.next()).await.unwrap().unwrap();
    assert_eq!(received, "degraded");

    cancel.cancel();
    pump.await.unwrap();
    client.close();
    server.stop().await;
}

#[tokio::test]
async fn test_uplink_sends_broker_topic_through_client() {
    let server = WireServer::new(WireConfig {
        port: 0,
        ..WireConfig::default()
    })
    .unwrap();
    let addr = server.start().await.unwrap();
    let mut inbound = server.inbound();
    let broker = Broker::new(BrokerConfig::default()).unwrap();

    let client = WireClient::new(WireConfig {
        port: addr.port(),
        ..WireConfig::default()
    })
    .unwrap();
    let cancel = CancellationToken::new();
    let pump = uplink(&broker, "jobs", &client, cancel.clone());

    // Queued in the client until it connects
    broker.push("jobs", &11u32).unwrap();
    broker.push("other", &12u32).unwrap();
    wait_until(|| client.pending() == 1).await;

    client.connect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
    let envelope = timeout(WAIT, inbound.recv()).await.unwrap().unwrap();
    assert_eq!(envelope.topic, "jobs");
    assert_eq!(envelope.decode_payload::<u32>().unwrap(), 11);

    // Closing the client ends the pump on its next envelope
    client.close();
    broker.push("jobs", &13u32).unwrap();
    timeout(WAIT, pump).await.unwrap().unwrap();

    cancel.cancel();
    server.stop().await;
}
