//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置 -> 解码器 -> 传输 -> 分发 全链路 (本地回环 TCP，无需真实设备)
//! - 多会话隔离
//! - 任意分片下的解码一致性

#[cfg(test)]
mod contract_tests {
    use contracts::DecoderPreset;

    #[test]
    fn test_presets_pass_validation() {
        for preset in DecoderPreset::ALL {
            assert!(preset.config().check().is_ok(), "{preset} invalid");
        }
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{SessionEvent, SinkConfig, SinkType, StreamEvent};
    use dispatcher::create_dispatcher;
    use ingestion::{BackpressureConfig, MockDevice, MockDeviceConfig, TcpIngest};
    use observability::EventStatsAggregator;
    use tokio::net::TcpStream;
    use tokio::sync::{mpsc, watch};

    const TEST_TIMEOUT: Duration = Duration::from_secs(10);

    fn file_sink(name: &str, sink_type: SinkType, path: &std::path::Path) -> SinkConfig {
        SinkConfig {
            name: name.to_string(),
            sink_type,
            queue_capacity: 512,
            params: HashMap::from([("path".to_string(), path.display().to_string())]),
        }
    }

    /// Send one mock capture to `addr`, then close the connection
    async fn run_device(addr: std::net::SocketAddr, config: MockDeviceConfig) -> u64 {
        let stream = TcpStream::connect(addr).await.unwrap();
        MockDevice::new(config).stream_to(stream).await.unwrap()
    }

    /// Collect events until `sessions` sessions have ended
    async fn collect_sessions(
        rx: &async_channel::Receiver<SessionEvent>,
        sessions: usize,
    ) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let mut ended = 0;
        while ended < sessions {
            let event = rx.recv().await.unwrap();
            if matches!(event.event, StreamEvent::SessionEnded { .. }) {
                ended += 1;
            }
            events.push(event);
        }
        events
    }

    /// End-to-end: mock device -> TCP listener -> decoder -> Dispatcher -> jsonl + hex sinks
    ///
    /// 验证完整的数据流：
    /// 1. 设备每第 3 帧丢掉序号 1 的包
    /// 2. 会话把事件按序发布
    /// 3. 两个文件 sink 各自收到全部事件
    #[tokio::test]
    async fn test_e2e_tcp_to_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let jsonl_path = dir.path().join("events.jsonl");
        let hex_path = dir.path().join("dump.hex");

        let blueprint = ConfigLoader::load_from_str(
            &format!(
                r#"
[decoder]
preset = "compact"

[transport]
listen_addr = "127.0.0.1:0"
channel_capacity = 256

[[sinks]]
name = "events"
sink_type = "jsonl"
params = {{ path = "{}" }}

[[sinks]]
name = "dump"
sink_type = "hex_file"
params = {{ path = "{}" }}
"#,
                jsonl_path.display(),
                hex_path.display()
            ),
            ConfigFormat::Toml,
        )
        .unwrap();

        // Dispatcher
        let (dispatch_tx, dispatch_rx) = mpsc::channel(256);
        let dispatcher = create_dispatcher(blueprint.sinks.clone(), dispatch_rx).unwrap();
        let sink_metrics = dispatcher.metrics();
        let dispatcher_handle = dispatcher.spawn();

        // Listener
        let listener = TcpIngest::bind(&blueprint.transport.listen_addr).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = async_channel::bounded(blueprint.transport.channel_capacity);
        let (stop_tx, stop_rx) = watch::channel(false);
        let ingest = TcpIngest::new(
            blueprint.to_decoder_config(),
            BackpressureConfig::from(&blueprint.transport),
            tx,
        )
        .with_shutdown(stop_rx);
        let metrics = ingest.metrics();
        let server = tokio::spawn(async move { ingest.serve_on(listener).await });

        let sent = run_device(
            addr,
            MockDeviceConfig {
                frames: 6,
                missing_sequence_every: Some(3),
                ..Default::default()
            },
        )
        .await;

        let events = tokio::time::timeout(TEST_TIMEOUT, collect_sessions(&rx, 1))
            .await
            .expect("session did not end");
        stop_tx.send(true).unwrap();
        server.await.unwrap().unwrap();

        let mut stats = EventStatsAggregator::new();
        for event in &events {
            stats.update(&event.event);
            dispatch_tx.send(event.clone()).await.unwrap();
        }
        drop(dispatch_tx);
        dispatcher_handle.await.unwrap();

        assert_eq!(stats.frames_complete, 4);
        assert_eq!(stats.count("sequence_error"), 2);
        // seq 3..=7 of each broken frame arrive with no frame open
        assert_eq!(stats.count("orphan_packet"), 10);
        assert_eq!(stats.sessions_ended, 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.bytes_received, sent);
        assert_eq!(snapshot.estimated_lost, 2);
        assert_eq!(snapshot.sessions_active(), 0);

        for (name, sink) in &sink_metrics {
            assert_eq!(sink.written(), events.len() as u64, "sink {name}");
        }

        let lines: Vec<serde_json::Value> = std::fs::read_to_string(&jsonl_path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), events.len());
        assert_eq!(lines.last().unwrap()["kind"], "session_ended");
        let sequence_error = lines
            .iter()
            .find(|line| line["kind"] == "sequence_error")
            .unwrap();
        assert_eq!(sequence_error["expected"], 1);
        assert_eq!(sequence_error["got"], 2);

        let dump = std::fs::read_to_string(&hex_path).unwrap();
        assert!(dump.contains("=== SESSION START session=tcp:"));
        assert_eq!(dump.matches("FRAME_COMPLETE").count(), 4);
        assert!(dump.contains("0A 00 00 00"));
        assert!(dump.trim_end().ends_with("==="));
    }

    /// Two devices connected at once never mix packets
    #[tokio::test]
    async fn test_concurrent_sessions_are_isolated() {
        let listener = TcpIngest::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = async_channel::bounded(1024);
        let (stop_tx, stop_rx) = watch::channel(false);
        let ingest = TcpIngest::new(
            Default::default(),
            BackpressureConfig::new(1024, Default::default()).with_read_buffer_size(13),
            tx,
        )
        .with_shutdown(stop_rx);
        let server = tokio::spawn(async move { ingest.serve_on(listener).await });

        let slow = MockDeviceConfig {
            frames: 8,
            frame_interval: Duration::from_millis(2),
            ..Default::default()
        };
        let faulty = MockDeviceConfig {
            frames: 8,
            frame_interval: Duration::from_millis(3),
            missing_sequence_every: Some(2),
            ..Default::default()
        };
        tokio::join!(run_device(addr, slow), run_device(addr, faulty));

        let events = tokio::time::timeout(TEST_TIMEOUT, collect_sessions(&rx, 2))
            .await
            .expect("sessions did not end");
        stop_tx.send(true).unwrap();
        server.await.unwrap().unwrap();

        let mut per_session: HashMap<String, EventStatsAggregator> = HashMap::new();
        for event in &events {
            per_session
                .entry(event.session_id.to_string())
                .or_default()
                .update(&event.event);
        }
        assert_eq!(per_session.len(), 2);

        let mut complete: Vec<u64> = per_session.values().map(|s| s.frames_complete).collect();
        complete.sort_unstable();
        assert_eq!(complete, vec![4, 8]);
        assert!(per_session.values().all(|s| s.sessions_ended == 1));

        // frame payloads stay contiguous per session
        for event in &events {
            if let StreamEvent::FrameComplete { frame } = &event.event {
                assert_eq!(frame.sequences(), (0..8).collect::<Vec<u8>>());
            }
        }
    }

    /// Client mode against a relay sending length-prefixed records, one with a zero length
    #[tokio::test]
    async fn test_connect_length_prefixed_relay() {
        use tokio::io::AsyncWriteExt;

        let decoder = contracts::DecoderPreset::CompactPrefixed.config();
        let device = MockDevice::new(MockDeviceConfig {
            frames: 3,
            ..MockDeviceConfig::for_decoder(&decoder)
        });
        let mut capture = device.frame_bytes(0);
        capture.extend_from_slice(&0u32.to_be_bytes());
        capture.extend(device.frame_bytes(1));
        capture.extend(device.frame_bytes(2));

        let relay = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = relay.local_addr().unwrap();
        let writer = tokio::spawn(async move {
            let (mut stream, _) = relay.accept().await.unwrap();
            stream.write_all(&capture).await.unwrap();
            stream.shutdown().await.unwrap();
        });

        let (tx, rx) = async_channel::bounded(256);
        let ingest = TcpIngest::new(decoder, BackpressureConfig::default(), tx);
        let summary = tokio::time::timeout(TEST_TIMEOUT, ingest.connect(&addr.to_string()))
            .await
            .unwrap()
            .unwrap();
        writer.await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.event.kind());
        }
        assert_eq!(
            kinds,
            vec![
                "frame_complete",
                "invalid_batch_length",
                "frame_complete",
                "frame_complete",
                "session_ended",
            ]
        );
        assert_eq!(summary.unconsumed_bytes, 0);
        assert_eq!(summary.events_emitted, 5);
    }
}

#[cfg(test)]
mod segmentation_tests {
    use contracts::StreamEvent;
    use frame_engine::StreamDecoder;
    use ingestion::{MockDevice, MockDeviceConfig};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn decode_in_chunks(bytes: &[u8], rng: &mut StdRng) -> Vec<StreamEvent> {
        let mut decoder = StreamDecoder::new(Default::default()).unwrap();
        let mut events = Vec::new();
        let mut rest = bytes;
        while !rest.is_empty() {
            let take = rng.random_range(1..=rest.len().min(200));
            let (chunk, tail) = rest.split_at(take);
            events.extend(decoder.on_bytes(chunk));
            rest = tail;
        }
        events.extend(decoder.on_end_of_stream());
        events
    }

    /// TCP may split the device stream anywhere; the event sequence must not change
    #[test]
    fn test_segmentation_does_not_change_events() {
        let device = MockDevice::new(MockDeviceConfig {
            frames: 40,
            missing_sequence_every: Some(5),
            corrupt_header_every: Some(7),
            noise_every: Some(3),
            noise_len: 17,
            ..Default::default()
        });
        let capture = device.generate();

        let mut whole = StreamDecoder::new(Default::default()).unwrap();
        let mut expected = whole.on_bytes(&capture);
        expected.extend(whole.on_end_of_stream());

        let mut rng = StdRng::seed_from_u64(0x11DA);
        for _ in 0..20 {
            assert_eq!(decode_in_chunks(&capture, &mut rng), expected);
        }

        let complete = expected
            .iter()
            .filter(|e| matches!(e, StreamEvent::FrameComplete { .. }))
            .count();
        assert_eq!(complete, device.intact_frames());
    }
}
