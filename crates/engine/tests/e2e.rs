//! End-to-end session scenarios against in-process mock servers speaking
//! the relay, auth, engine-selection, and UCI wire protocols.

mod common;

use common::{
    closed_port, linger, next_line, record_lines, send, wait_closed, MockServer, RecordingReport,
};
use config::{AuthMethod, Endpoint};
use engine::NetworkEngine;
use ntest::timeout;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::io::{BufRead, BufReader, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn endpoint(port: u16) -> Endpoint {
    Endpoint {
        host: "127.0.0.1".into(),
        port,
        auth_method: AuthMethod::None,
        ..Endpoint::default()
    }
}

fn start_engine(endpoint: Endpoint, report: &Arc<RecordingReport>) -> NetworkEngine {
    let engine = NetworkEngine::new(endpoint, "test-net-id", report.clone());
    engine.start();
    engine
}

#[test]
#[timeout(30000)]
fn plain_session_delivers_banner_in_order() {
    let server = MockServer::spawn(|mut sock| {
        send(&mut sock, "id name StubEngine\nuciok\n");
        linger(sock);
    });
    let report = RecordingReport::new();
    let engine = start_engine(endpoint(server.port), &report);

    assert_eq!(
        next_line(&engine, Duration::from_secs(2)).as_deref(),
        Some("id name StubEngine")
    );
    assert_eq!(
        next_line(&engine, Duration::from_secs(2)).as_deref(),
        Some("uciok")
    );
    assert!(engine.is_running());
    assert!(engine.uci_ok());

    engine.shutdown();
    server.join();
    assert!(report.errors().is_empty(), "got {:?}", report.errors());
}

#[test]
#[timeout(30000)]
fn token_auth_succeeds_and_gates_the_writer() {
    let received = Arc::new(Mutex::new(Vec::new()));
    let server = {
        let received = received.clone();
        MockServer::spawn(move |mut sock| {
            send(&mut sock, "AUTH_REQUIRED\n");
            let mut reader = BufReader::new(sock.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            received.lock().unwrap().push(line.trim_end().to_string());
            send(&mut sock, "AUTH_OK\nid name StubEngine\nuciok\n");
            record_lines(sock, &received);
        })
    };

    let mut ep = endpoint(server.port);
    ep.auth_method = AuthMethod::Token;
    ep.auth_token = "abc".into();

    let report = RecordingReport::new();
    let engine = start_engine(ep, &report);
    // Queued before the connection even exists; must not hit the wire
    // until after AUTH_OK.
    engine.write_line("uci");

    // The GUI never sees the auth exchange.
    assert_eq!(
        next_line(&engine, Duration::from_secs(2)).as_deref(),
        Some("id name StubEngine")
    );
    assert_eq!(
        next_line(&engine, Duration::from_secs(2)).as_deref(),
        Some("uciok")
    );

    engine.shutdown();
    server.join();

    let received = received.lock().unwrap().clone();
    assert_eq!(received.first().map(String::as_str), Some("AUTH abc"));
    assert_eq!(received.get(1).map(String::as_str), Some("uci"));
    assert!(report.errors().is_empty(), "got {:?}", report.errors());
}

#[test]
#[timeout(30000)]
fn psk_auth_uses_the_psk_command() {
    let received = Arc::new(Mutex::new(Vec::new()));
    let server = {
        let received = received.clone();
        MockServer::spawn(move |mut sock| {
            send(&mut sock, "AUTH_REQUIRED token,psk\n");
            let mut reader = BufReader::new(sock.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            received.lock().unwrap().push(line.trim_end().to_string());
            send(&mut sock, "AUTH_OK\nuciok\n");
            record_lines(sock, &received);
        })
    };

    let mut ep = endpoint(server.port);
    ep.auth_method = AuthMethod::Psk;
    ep.psk_key = "deep-secret".into();

    let report = RecordingReport::new();
    let engine = start_engine(ep, &report);
    assert_eq!(
        next_line(&engine, Duration::from_secs(2)).as_deref(),
        Some("uciok")
    );
    engine.shutdown();
    server.join();

    assert_eq!(
        received.lock().unwrap().first().map(String::as_str),
        Some("PSK_AUTH deep-secret")
    );
    assert!(report.errors().is_empty());
}

#[test]
#[timeout(30000)]
fn failed_auth_reports_and_closes() {
    let server = MockServer::spawn(|mut sock| {
        send(&mut sock, "AUTH_REQUIRED\n");
        let mut reader = BufReader::new(sock.try_clone().unwrap());
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        send(&mut sock, "AUTH_FAIL\n");
    });

    let mut ep = endpoint(server.port);
    ep.auth_method = AuthMethod::Token;
    ep.auth_token = "wrong".into();

    let report = RecordingReport::new();
    let engine = start_engine(ep, &report);

    assert_eq!(
        report.wait_for_error(Duration::from_secs(5)).as_deref(),
        Some("Authentication failed")
    );
    wait_closed(&engine, Duration::from_secs(5));
    engine.shutdown();
    server.join();
}

#[test]
#[timeout(30000)]
fn tls_fingerprint_mismatch_reports_distinctly() {
    let key_pair = rcgen::KeyPair::generate().unwrap();
    let cert = rcgen::CertificateParams::new(vec!["localhost".to_string()])
        .unwrap()
        .self_signed(&key_pair)
        .unwrap();
    let server_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(
            vec![CertificateDer::from(cert.der().to_vec())],
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
        )
        .unwrap();

    let server = MockServer::spawn(move |sock| {
        let conn = rustls::ServerConnection::new(Arc::new(server_config)).unwrap();
        let mut stream = rustls::StreamOwned::new(conn, sock);
        // The client rejects our certificate; the write surfaces the alert.
        let _ = stream.write_all(b"uciok\n");
    });

    let mut ep = endpoint(server.port);
    ep.use_tls = true;
    ep.cert_fingerprint = vec!["ab"; 32].join(":");

    let report = RecordingReport::new();
    let engine = start_engine(ep, &report);

    assert_eq!(
        report.wait_for_error(Duration::from_secs(10)).as_deref(),
        Some("Server certificate fingerprint mismatch")
    );
    wait_closed(&engine, Duration::from_secs(5));
    engine.shutdown();
    server.join();
}

#[test]
#[timeout(30000)]
fn engine_selection_picks_the_requested_engine() {
    let server = MockServer::spawn(|mut sock| {
        let mut reader = BufReader::new(sock.try_clone().unwrap());
        common::expect_line(&mut reader, "ENGINE_LIST");
        send(
            &mut sock,
            "ENGINE Stockfish\nENGINE Dragon\nENGINE Maia\nENGINES_END\n",
        );
        common::expect_line(&mut reader, "SELECT_ENGINE Dragon");
        send(&mut sock, "ENGINE_SELECTED\nid name Dragon\nuciok\n");
        linger(sock);
    });

    let mut ep = endpoint(server.port);
    ep.selected_engine = "Dragon".into();

    let report = RecordingReport::new();
    let engine = start_engine(ep, &report);

    assert_eq!(
        next_line(&engine, Duration::from_secs(2)).as_deref(),
        Some("id name Dragon")
    );
    engine.shutdown();
    server.join();
    assert!(report.errors().is_empty(), "got {:?}", report.errors());
}

#[test]
#[timeout(30000)]
fn missing_engine_reports_unavailable() {
    let server = MockServer::spawn(|mut sock| {
        let mut reader = BufReader::new(sock.try_clone().unwrap());
        common::expect_line(&mut reader, "ENGINE_LIST");
        send(&mut sock, "ENGINE Stockfish\nENGINE Maia\nENGINES_END\n");
        linger(sock);
    });

    let mut ep = endpoint(server.port);
    ep.selected_engine = "Dragon".into();

    let report = RecordingReport::new();
    let engine = start_engine(ep, &report);

    assert_eq!(
        report.wait_for_error(Duration::from_secs(5)).as_deref(),
        Some("Engine not available: Dragon")
    );
    wait_closed(&engine, Duration::from_secs(5));
    engine.shutdown();
    server.join();
}

#[test]
#[timeout(30000)]
fn relay_fallback_bridges_without_losing_bytes() {
    let relay_received = Arc::new(Mutex::new(Vec::new()));
    let relay = {
        let relay_received = relay_received.clone();
        MockServer::spawn(move |mut sock| {
            let mut reader = BufReader::new(sock.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            relay_received.lock().unwrap().push(line.trim_end().to_string());
            // Rendezvous response and the bridged server's banner arrive in
            // one segment; the client must still see every banner byte.
            send(&mut sock, "CONNECTED\nid name StubEngine\nuciok\n");
            linger(sock);
        })
    };

    let mut ep = endpoint(closed_port()); // LAN path fails fast
    ep.relay_host = "127.0.0.1".into();
    ep.relay_port = relay.port;
    ep.relay_session_id = "sess-99".into();

    let report = RecordingReport::new();
    let engine = start_engine(ep, &report);

    assert_eq!(
        next_line(&engine, Duration::from_secs(5)).as_deref(),
        Some("id name StubEngine")
    );
    assert_eq!(
        next_line(&engine, Duration::from_secs(2)).as_deref(),
        Some("uciok")
    );
    assert!(engine.is_running());

    engine.shutdown();
    relay.join();

    assert_eq!(
        relay_received.lock().unwrap().first().map(String::as_str),
        Some("SESSION sess-99 client")
    );
    assert!(report.errors().is_empty(), "got {:?}", report.errors());
}

#[test]
#[timeout(30000)]
fn post_gate_auth_required_is_a_config_mismatch() {
    let server = MockServer::spawn(|mut sock| {
        send(&mut sock, "AUTH_REQUIRED\n");
        linger(sock);
    });

    // Client configured with no auth at all: the pre-gate phase reads
    // nothing, so the server's demand arrives after the gate.
    let report = RecordingReport::new();
    let engine = start_engine(endpoint(server.port), &report);

    assert_eq!(
        report.wait_for_error(Duration::from_secs(5)).as_deref(),
        Some("Server requires authentication but none is configured")
    );
    wait_closed(&engine, Duration::from_secs(5));
    engine.shutdown();
    server.join();
}

#[test]
#[timeout(30000)]
fn remote_close_after_start_reports_termination() {
    let server = MockServer::spawn(|mut sock| {
        send(&mut sock, "id name StubEngine\nuciok\n");
        // Drop the connection mid-session.
    });

    let report = RecordingReport::new();
    let engine = start_engine(endpoint(server.port), &report);

    assert_eq!(
        next_line(&engine, Duration::from_secs(2)).as_deref(),
        Some("id name StubEngine")
    );
    assert_eq!(
        report.wait_for_error(Duration::from_secs(5)).as_deref(),
        Some("Engine terminated")
    );
    wait_closed(&engine, Duration::from_secs(5));
    engine.shutdown();
    server.join();
}

#[test]
#[timeout(30000)]
fn shutdown_suppresses_teardown_errors() {
    let server = MockServer::spawn(|mut sock| {
        send(&mut sock, "id name StubEngine\nuciok\n");
        linger(sock);
    });

    let report = RecordingReport::new();
    let engine = start_engine(endpoint(server.port), &report);
    assert_eq!(
        next_line(&engine, Duration::from_secs(2)).as_deref(),
        Some("id name StubEngine")
    );

    engine.shutdown();
    server.join();
    assert!(report.errors().is_empty(), "got {:?}", report.errors());
}

#[test]
#[timeout(30000)]
fn writer_tracks_position_and_go_lines() {
    let received = Arc::new(Mutex::new(Vec::new()));
    let server = {
        let received = received.clone();
        MockServer::spawn(move |mut sock| {
            send(&mut sock, "uciok\n");
            record_lines(sock, &received);
        })
    };

    let report = RecordingReport::new();
    let engine = start_engine(endpoint(server.port), &report);
    assert_eq!(
        next_line(&engine, Duration::from_secs(2)).as_deref(),
        Some("uciok")
    );

    engine.write_line("position startpos moves e2e4");
    engine.write_line("go movetime 1000");
    engine.write_line("stop");

    // Wait for the writer to flush everything before inspecting.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while received.lock().unwrap().len() < 3 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }

    assert_eq!(
        engine.last_position_line().as_deref(),
        Some("position startpos moves e2e4")
    );
    assert_eq!(engine.last_go_line().as_deref(), Some("go movetime 1000"));
    assert_eq!(
        received.lock().unwrap().as_slice(),
        &[
            "position startpos moves e2e4".to_string(),
            "go movetime 1000".to_string(),
            "stop".to_string(),
        ]
    );

    engine.shutdown();
    server.join();
    assert!(report.errors().is_empty(), "got {:?}", report.errors());
}
