//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置样例可加载
//! - 进程内 e2e 测试（StreamHub 直接调用）
//! - WebSocket e2e 测试（真实监听端口）

#[cfg(test)]
mod config_tests {
    use std::path::PathBuf;

    use config_loader::ConfigLoader;
    use contracts::Severity;

    fn sample_config_path() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../streamgate.toml")
    }

    #[test]
    fn test_sample_config_loads() {
        let config = ConfigLoader::load_from_path(&sample_config_path()).unwrap();

        assert_eq!(config.server.bind_addr, "127.0.0.1:7070");
        assert_eq!(config.ingest.event_rules.len(), 2);
        assert_eq!(config.ingest.event_rules[0].severity, Severity::Critical);
        // 未写 severity 的规则取默认值
        assert_eq!(config.ingest.event_rules[1].severity, Severity::Warning);
        assert_eq!(config.telemetry.metrics_port, Some(9000));
    }

    #[test]
    fn test_sample_config_survives_toml_rewrite() {
        let config = ConfigLoader::load_from_path(&sample_config_path()).unwrap();
        let toml = ConfigLoader::to_toml(&config).unwrap();
        let reparsed =
            ConfigLoader::load_from_str(&toml, config_loader::ConfigFormat::Toml).unwrap();

        assert_eq!(reparsed.session.history_capacity, config.session.history_capacity);
        assert_eq!(reparsed.ingest.event_rules.len(), 2);
    }
}

#[cfg(test)]
mod hub_tests {
    use std::time::Duration;

    use chrono::Utc;
    use contracts::{
        AlertSubscription, Batch, CloseReason, CollabMessage, EventRule, Record, ServiceConfig,
        Severity, Subscription,
    };
    use server::{HealthStatus, StreamHub};
    use stream_channel::{channel, Delivery};
    use tokio::time::timeout;

    fn config_with_cpu_rule() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.ingest.event_rules = vec![EventRule {
            metric_name: "cpu".into(),
            severity: Severity::Critical,
            title: Some("cpu hot".into()),
            min_value: Some(90.0),
        }];
        config
    }

    /// Ingestion -> store -> snapshots, and ingestion -> bus -> alerts
    #[tokio::test]
    async fn test_ingest_feeds_snapshots_and_alerts() {
        let hub = StreamHub::new(config_with_cpu_rule()).unwrap();

        let (alerts, _subscriber) =
            hub.subscribe_alerts(AlertSubscription::default().with_severity(Severity::Critical));
        let snapshots = hub.subscribe_snapshots(Subscription::for_metrics(["cpu"], 0));

        let (tx, rx) = channel(4, Delivery::Reliable);
        let ingest = {
            let hub = hub.clone();
            tokio::spawn(async move { hub.ingest(rx).await })
        };
        tx.send(Batch::new(
            "b1",
            "host-1",
            vec![
                Record::new("r1", "cpu", 50.0, Utc::now()),
                Record::new("r2", "cpu", 95.0, Utc::now()),
            ],
        ))
        .await
        .unwrap();
        drop(tx);

        let result = ingest.await.unwrap();
        assert_eq!(result.accepted_count, 2);
        assert_eq!(result.rejected_count, 0);
        assert_eq!(result.batch_id, "b1");

        let event = timeout(Duration::from_secs(2), alerts.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.title, "cpu hot");
        assert_eq!(event.source, "host-1");

        // 首帧可能早于写入，等到出现最新值为止
        let latest = timeout(Duration::from_secs(3), async {
            loop {
                let snapshot = snapshots.stream.recv().await.unwrap();
                if let Some(value) = snapshot.values.first() {
                    return value.value;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(latest, 95.0);

        let summary = hub.ingest_summary();
        assert_eq!(summary.total_calls, 1);
        assert_eq!(summary.total_accepted, 2);
        assert_eq!(hub.health().records_accepted, 2);
    }

    #[tokio::test]
    async fn test_shutdown_ends_every_stream() {
        let hub = StreamHub::new(ServiceConfig::default()).unwrap();

        let snapshots = hub.subscribe_snapshots(Subscription::for_metrics(["cpu"], 1_000));
        let (alerts, subscriber) = hub.subscribe_alerts(AlertSubscription::default());
        let (_session_tx, session_rx) = channel::<CollabMessage>(4, Delivery::Reliable);
        let session = hub.join_session("room", "alice", session_rx).await.unwrap();

        assert_eq!(hub.health().status, HealthStatus::Serving);
        hub.shutdown();
        assert_eq!(hub.health().status, HealthStatus::Draining);

        let drained = timeout(Duration::from_secs(2), async {
            loop {
                if let Err(end) = snapshots.stream.recv().await {
                    break end.reason;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(drained, CloseReason::Shutdown);

        let end = timeout(Duration::from_secs(2), alerts.recv())
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(end.reason, CloseReason::Shutdown);
        assert_eq!(subscriber.finished().await, CloseReason::Shutdown);

        let end = timeout(Duration::from_secs(2), async {
            loop {
                if let Err(end) = session.recv().await {
                    break end;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(end.reason, CloseReason::Shutdown);
    }

    #[tokio::test]
    async fn test_archive_receives_accepted_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServiceConfig::default();
        config.archive.enabled = true;
        config.archive.path = dir.path().to_path_buf();
        let hub = StreamHub::new(config).unwrap();

        let (tx, rx) = channel(4, Delivery::Reliable);
        tx.send(Batch::new(
            "b1",
            "host-1",
            vec![
                Record::new("r1", "mem", 1.0, Utc::now()),
                Record::new("r2", "mem", "oops", Utc::now()),
            ],
        ))
        .await
        .unwrap();
        drop(tx);
        let result = hub.ingest(rx).await;
        assert_eq!(result.accepted_count, 1);
        assert_eq!(result.rejected_count, 1);

        hub.drain().await;

        // 归档按日期分目录
        let mut archived = String::new();
        for day in std::fs::read_dir(dir.path()).unwrap() {
            for file in std::fs::read_dir(day.unwrap().path()).unwrap() {
                archived.push_str(&std::fs::read_to_string(file.unwrap().path()).unwrap());
            }
        }
        assert!(archived.contains("\"r1\""));
        assert!(!archived.contains("\"r2\""));
    }
}

#[cfg(test)]
mod ws_tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use chrono::Utc;
    use contracts::{
        AlertSubscription, Batch, CloseReason, CollabMessage, EventRule, MessageKind, Record,
        ServiceConfig, Severity, Subscription,
    };
    use futures_util::{SinkExt, StreamExt};
    use server::{ClientFrame, Server, ServerError, ServerFrame, StreamHub};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::{self, Message};
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    struct Running {
        hub: StreamHub,
        addr: SocketAddr,
        task: JoinHandle<Result<(), ServerError>>,
    }

    async fn start(config: ServiceConfig) -> Running {
        let hub = StreamHub::new(config).unwrap();
        let server = Server::bind_to(hub.clone(), "127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let task = tokio::spawn(server.run());
        Running { hub, addr, task }
    }

    async fn connect(addr: SocketAddr, path: &str) -> Client {
        let (ws, _) = connect_async(format!("ws://{addr}{path}")).await.unwrap();
        ws
    }

    async fn send(ws: &mut Client, frame: &ClientFrame) {
        let json = serde_json::to_string(frame).unwrap();
        ws.send(Message::text(json)).await.unwrap();
    }

    async fn recv(ws: &mut Client) -> ServerFrame {
        loop {
            let message = timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("socket ended")
                .expect("socket error");
            match message {
                Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
                Message::Close(frame) => panic!("socket closed: {frame:?}"),
                _ => continue,
            }
        }
    }

    /// Poll until `check` holds
    async fn wait_until(mut check: impl FnMut() -> bool) {
        timeout(Duration::from_secs(3), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition never held");
    }

    #[tokio::test]
    async fn test_ingest_over_websocket() {
        let running = start(ServiceConfig::default()).await;
        let mut ws = connect(running.addr, "/v1/ingest").await;

        send(
            &mut ws,
            &ClientFrame::Batch(Batch::new(
                "b1",
                "p",
                vec![
                    Record::new("r1", "m1", 10.0, Utc::now()),
                    Record::new("r2", "m1", 20.0, Utc::now()),
                ],
            )),
        )
        .await;
        send(
            &mut ws,
            &ClientFrame::Batch(Batch::new(
                "b2",
                "p",
                vec![Record::new("r3", "m1", "bad", Utc::now())],
            )),
        )
        .await;
        send(
            &mut ws,
            &ClientFrame::Batch(Batch::new(
                "b3",
                "p",
                vec![Record::new("r4", "m2", 5.0, Utc::now())],
            )),
        )
        .await;
        send(&mut ws, &ClientFrame::End).await;

        let ServerFrame::Result(result) = recv(&mut ws).await else {
            panic!("expected result frame");
        };
        assert_eq!(result.accepted_count, 3);
        assert_eq!(result.rejected_count, 1);
        assert_eq!(result.errors, vec!["invalid value".to_string()]);
        assert_eq!(result.batch_id, "b3");
        assert_eq!(recv(&mut ws).await, ServerFrame::end(CloseReason::Completed));

        assert_eq!(running.hub.store().point_count("m1").await, 2);
    }

    #[tokio::test]
    async fn test_invalid_frame_keeps_stream_open() {
        let running = start(ServiceConfig::default()).await;
        let mut ws = connect(running.addr, "/v1/ingest").await;

        ws.send(Message::text("not json")).await.unwrap();
        assert!(matches!(recv(&mut ws).await, ServerFrame::Error { .. }));

        send(&mut ws, &ClientFrame::Subscribe(Subscription::for_metrics(["x"], 0))).await;
        let ServerFrame::Error { message } = recv(&mut ws).await else {
            panic!("expected error frame");
        };
        assert!(message.contains("subscribe"));

        send(&mut ws, &ClientFrame::End).await;
        let ServerFrame::Result(result) = recv(&mut ws).await else {
            panic!("expected result frame");
        };
        assert_eq!(result.batches_received, 0);
    }

    #[tokio::test]
    async fn test_session_chat_over_websocket() {
        let running = start(ServiceConfig::default()).await;
        let sessions = running.hub.clone();

        let mut alice = connect(running.addr, "/v1/sessions/room?participant_id=alice").await;
        wait_until(|| sessions.sessions().participant_count() == 1).await;
        let mut bob = connect(running.addr, "/v1/sessions/room?participant_id=bob").await;

        let ServerFrame::Message(notice) = recv(&mut alice).await else {
            panic!("expected join notice");
        };
        assert_eq!(notice.kind, MessageKind::System);
        assert_eq!(notice.body, "bob joined");

        send(
            &mut bob,
            &ClientFrame::Message(CollabMessage::chat("room", "bob", "hello")),
        )
        .await;
        let ServerFrame::Message(chat) = recv(&mut alice).await else {
            panic!("expected chat message");
        };
        assert_eq!(chat.sender_id, "bob");
        assert_eq!(chat.body, "hello");

        // 重复加入被拒绝
        let mut again = connect(running.addr, "/v1/sessions/room?participant_id=bob").await;
        assert!(matches!(recv(&mut again).await, ServerFrame::Error { .. }));
        let ServerFrame::End { reason } = recv(&mut again).await else {
            panic!("expected end frame");
        };
        assert!(matches!(reason, CloseReason::Rejected(_)));

        send(&mut bob, &ClientFrame::End).await;
        let ServerFrame::Message(notice) = recv(&mut alice).await else {
            panic!("expected leave notice");
        };
        assert!(notice.body.starts_with("bob left"));
    }

    #[tokio::test]
    async fn test_alerts_from_websocket_ingest() {
        let mut config = ServiceConfig::default();
        config.ingest.event_rules = vec![EventRule {
            metric_name: "disk_errors".into(),
            severity: Severity::Warning,
            title: None,
            min_value: None,
        }];
        let running = start(config).await;

        let mut alerts = connect(running.addr, "/v1/alerts").await;
        send(
            &mut alerts,
            &ClientFrame::SubscribeAlerts(AlertSubscription::default().with_source("storage-7")),
        )
        .await;
        let hub = running.hub.clone();
        wait_until(|| hub.health().alert_subscribers == 1).await;

        let mut ingest = connect(running.addr, "/v1/ingest").await;
        for (batch_id, source) in [("b1", "storage-1"), ("b2", "storage-7")] {
            send(
                &mut ingest,
                &ClientFrame::Batch(Batch::new(
                    batch_id,
                    source,
                    vec![Record::new(batch_id, "disk_errors", 3.0, Utc::now())],
                )),
            )
            .await;
        }
        send(&mut ingest, &ClientFrame::End).await;
        assert!(matches!(recv(&mut ingest).await, ServerFrame::Result(_)));

        let ServerFrame::Event(event) = recv(&mut alerts).await else {
            panic!("expected event frame");
        };
        assert_eq!(event.source, "storage-7");
        assert_eq!(event.severity, Severity::Warning);
        assert_eq!(event.context.get("batch_id").map(String::as_str), Some("b2"));

        send(&mut alerts, &ClientFrame::End).await;
        assert_eq!(recv(&mut alerts).await, ServerFrame::end(CloseReason::Cancelled));
    }

    #[tokio::test]
    async fn test_connection_limit_refuses_upgrade() {
        let mut config = ServiceConfig::default();
        config.server.max_connections = 1;
        let running = start(config).await;

        let _first = connect(running.addr, "/v1/alerts").await;
        let hub = running.hub.clone();
        wait_until(|| hub.registry().active() == 1).await;

        let err = connect_async(format!("ws://{}/v1/alerts", running.addr))
            .await
            .err()
            .unwrap();
        let tungstenite::Error::Http(response) = err else {
            panic!("expected http refusal, got {err:?}");
        };
        assert_eq!(response.status().as_u16(), 503);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let running = start(ServiceConfig::default()).await;

        let mut stream = TcpStream::connect(running.addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"status\":\"serving\""));
        assert!(response.contains("\"max_connections\":1024"));
    }

    #[tokio::test]
    async fn test_shutdown_over_websocket() {
        let running = start(ServiceConfig::default()).await;

        let mut ws = connect(running.addr, "/v1/snapshots").await;
        send(
            &mut ws,
            &ClientFrame::Subscribe(Subscription::for_metrics(["cpu"], 100)),
        )
        .await;
        assert!(matches!(recv(&mut ws).await, ServerFrame::Snapshot(_)));

        running.hub.shutdown();
        let reason = loop {
            match recv(&mut ws).await {
                ServerFrame::Snapshot(_) => continue,
                ServerFrame::End { reason } => break reason,
                other => panic!("unexpected frame {other:?}"),
            }
        };
        assert_eq!(reason, CloseReason::Shutdown);

        timeout(Duration::from_secs(5), running.task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(running.hub.registry().active(), 0);
    }
}
