//! Engine lifecycle tests: arm, busy rejection, stop and shutdown.
//!
//! A real PUB socket is bound on a loopback port so the engine's
//! subscriber has something to connect to; control traffic goes through
//! the scripted transport.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::json;
use zeromq::{PubSocket, Socket, SocketSend, ZmqMessage};

use xspd_acq::AcquisitionEngine;
use xspd_client::{MockTransport, XspdApi};
use xspd_core::XspdError;

const DEVICES_URI: &str = "http://localhost:8080/api/v1/devices";

async fn bind_pub_socket() -> (PubSocket, u16) {
    let mut socket = PubSocket::new();
    let endpoint = socket.bind("tcp://127.0.0.1:0").await.unwrap();
    let endpoint = endpoint.to_string();
    let port: u16 = endpoint
        .rsplit(':')
        .next()
        .unwrap()
        .parse()
        .expect("bound endpoint has a port");
    (socket, port)
}

fn mock_init_seq(mock: &MockTransport, data_port: u16) {
    mock.expect(
        "http://localhost:8080/api",
        json!({"api version": "1", "xspd version": "1.2.3"}),
    );
    mock.expect(DEVICES_URI, json!({"devices": [{"id": "device123"}]}));
    mock.expect(
        format!("{DEVICES_URI}/device123/variables?path=info"),
        json!({
            "value": {
                "libxsp version": "4.5.6",
                "detectors": [{
                    "detector-id": "lambda",
                    "modules": [{
                        "module": "lambda/mod0",
                        "firmware": "v1.0",
                        "chip-ids": ["chipA"]
                    }]
                }]
            }
        }),
    );
    mock.expect(
        format!("{DEVICES_URI}/device123"),
        json!({
            "system": {
                "data-ports": [{"id": "port01", "ip": "127.0.0.1", "port": data_port}]
            }
        }),
    );
}

fn mock_read_config(mock: &MockTransport) {
    let var = |path: &str| format!("{DEVICES_URI}/device123/variables?path={path}");
    mock.expect(var("port01/frame_width"), json!({"value": 4}));
    mock.expect(var("port01/frame_height"), json!({"value": 2}));
    mock.expect(var("lambda/bit_depth"), json!({"value": 12}));
    mock.expect(var("lambda/compressor"), json!({"value": "NONE"}));
    mock.expect(var("lambda/counter_mode"), json!({"value": "SINGLE"}));
    mock.expect(var("lambda/n_frames"), json!({"value": 5}));
}

fn mock_command(mock: &MockTransport, command: &str) {
    mock.expect(
        format!("{DEVICES_URI}/device123/commands"),
        json!([{"path": "lambda/start"}, {"path": "lambda/stop"}]),
    );
    mock.expect(
        format!("{DEVICES_URI}/device123/commands?path=lambda/{command}"),
        json!({"status": command}),
    );
}

#[tokio::test]
async fn start_stop_lifecycle() {
    let (_pub_socket, port) = bind_pub_socket().await;

    let mock = Arc::new(MockTransport::new());
    mock_init_seq(&mock, port);

    let mut api = XspdApi::new(
        "localhost",
        8080,
        Arc::clone(&mock) as Arc<dyn xspd_client::Transport>,
    );
    let detector = api.initialize(Some("device123")).await.unwrap();

    let engine = AcquisitionEngine::connect(Arc::new(api), detector, Duration::from_secs(60))
        .await
        .unwrap();
    assert!(!engine.is_acquiring());
    assert_eq!(engine.frames_published(), 0);

    mock_read_config(&mock);
    mock_command(&mock, "start");
    engine.start().await.unwrap();
    assert!(engine.is_acquiring());

    // A second start while armed fails fast without touching the device.
    let err = engine.start().await.unwrap_err();
    assert!(matches!(err, XspdError::Busy));

    mock_command(&mock, "stop");
    engine.stop().await.unwrap();
    assert!(!engine.is_acquiring());

    // Stop when idle is a no-op with no device traffic.
    let requests_before = mock.requests().len();
    engine.stop().await.unwrap();
    assert_eq!(mock.requests().len(), requests_before);

    engine.shutdown().await;
}

#[tokio::test]
async fn malformed_message_does_not_stall_the_stream() {
    let (mut pub_socket, port) = bind_pub_socket().await;

    let mock = Arc::new(MockTransport::new());
    mock_init_seq(&mock, port);

    let mut api = XspdApi::new(
        "localhost",
        8080,
        Arc::clone(&mock) as Arc<dyn xspd_client::Transport>,
    );
    let detector = api.initialize(Some("device123")).await.unwrap();

    let engine = AcquisitionEngine::connect(Arc::new(api), detector, Duration::from_secs(60))
        .await
        .unwrap();
    let mut frames = engine.subscribe_frames();

    mock_read_config(&mock);
    mock_command(&mock, "start");
    engine.start().await.unwrap();

    // Let the subscription handshake reach the publisher before sending.
    tokio::time::sleep(Duration::from_millis(250)).await;

    // Two parts instead of three: the message is dropped and logged.
    let bad = ZmqMessage::try_from(vec![
        Bytes::from_static(b"frames"),
        Bytes::from_static(&[1, 0, 1, 0, 0, 0, 16, 0]),
    ])
    .unwrap();
    pub_socket.send(bad).await.unwrap();

    // The 4x2 12-bit frame behind it must still come through.
    let good = ZmqMessage::try_from(vec![
        Bytes::from_static(b"frames"),
        Bytes::from_static(&[2, 0, 1, 0, 0, 0, 16, 0]),
        Bytes::from(vec![7u8; 16]),
    ])
    .unwrap();
    pub_socket.send(good).await.unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), frames.recv())
        .await
        .expect("stream kept delivering after the malformed message")
        .unwrap();
    assert_eq!(frame.frame_number, 2);
    assert_eq!(engine.frames_published(), 1);

    mock_command(&mock, "stop");
    engine.stop().await.unwrap();
    engine.shutdown().await;
}

#[tokio::test]
async fn start_propagates_command_failure() {
    let (_pub_socket, port) = bind_pub_socket().await;

    let mock = Arc::new(MockTransport::new());
    mock_init_seq(&mock, port);

    let mut api = XspdApi::new(
        "localhost",
        8080,
        Arc::clone(&mock) as Arc<dyn xspd_client::Transport>,
    );
    let detector = api.initialize(Some("device123")).await.unwrap();

    let engine = AcquisitionEngine::connect(Arc::new(api), detector, Duration::from_secs(60))
        .await
        .unwrap();

    mock_read_config(&mock);
    // Advertised list without "start": the command is rejected client-side
    // and the engine stays disarmed.
    mock.expect(
        format!("{DEVICES_URI}/device123/commands"),
        json!([{"path": "lambda/stop"}]),
    );
    let err = engine.start().await.unwrap_err();
    assert!(matches!(err, XspdError::UnknownCommand { .. }));
    assert!(!engine.is_acquiring());

    engine.shutdown().await;
}
