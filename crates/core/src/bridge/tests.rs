use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use futures_util::future::join_all;
use serde_json::{Value, json};

use super::*;
use crate::error::Error;
use crate::session::InstanceSource;
use crate::testing::{FakeDialer, FakeLauncher, Outcome};

fn explicit(endpoint: &str) -> BridgeConfig {
	BridgeConfig {
		endpoint: Some(endpoint.into()),
		..BridgeConfig::default()
	}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_operations_are_serialized() {
	let dialer = Arc::new(FakeDialer::new());
	let bridge = Bridge::with_parts(explicit("ws://10.0.0.5:9222/devtools/browser/x"), dialer.clone(), Arc::new(FakeLauncher::new())).unwrap();
	let running = Arc::new(AtomicUsize::new(0));

	let ops = (0..6).map(|i| {
		let running = Arc::clone(&running);
		bridge.execute(move |session| async move {
			assert_eq!(running.fetch_add(1, Ordering::SeqCst), 0, "operations overlapped");
			session.send("Runtime.evaluate", json!({ "expression": i.to_string() })).await?;
			tokio::time::sleep(Duration::from_millis(5)).await;
			running.fetch_sub(1, Ordering::SeqCst);
			Ok((i, session.generation()))
		})
	});
	let results: Vec<(usize, u64)> = join_all(ops).await.into_iter().map(|r| r.unwrap()).collect();

	assert_eq!(results.iter().map(|r| r.0).collect::<Vec<_>>(), (0..6).collect::<Vec<_>>());
	assert!(results.iter().all(|r| r.1 == 1));
	assert_eq!(dialer.connects().len(), 1);

	let sent: Vec<String> = dialer.channels()[0]
		.calls()
		.into_iter()
		.filter(|c| c.0 == "Runtime.evaluate")
		.map(|c| c.1["expression"].as_str().unwrap_or_default().to_string())
		.collect();
	assert_eq!(sent, vec!["0", "1", "2", "3", "4", "5"]);
}

#[tokio::test]
async fn operations_after_a_switch_see_the_new_session() {
	let dialer = Arc::new(
		FakeDialer::new()
			.name("second.lan", [10, 0, 0, 8])
			.outcome("10.0.0.8:9222", Outcome::Succeed),
	);
	let bridge = Bridge::with_parts(explicit("ws://10.0.0.5:9222/devtools/browser/x"), dialer.clone(), Arc::new(FakeLauncher::new())).unwrap();

	let before = bridge.execute(|session| async move { Ok(session) }).await.unwrap();
	let confirmation = bridge.switch_to("second.lan:9222".parse().unwrap()).await.unwrap();
	assert_eq!(confirmation.generation, 2);

	let (generation, endpoint) = bridge
		.execute(|session| async move { Ok((session.generation(), session.endpoint().to_string())) })
		.await
		.unwrap();
	assert_eq!(generation, 2);
	assert_eq!(endpoint, "ws://10.0.0.8:9222/devtools/browser/fake");

	let stale = before.send("Browser.getVersion", json!({})).await.unwrap_err();
	assert!(matches!(stale, Error::StaleSession { generation: 1 }), "{stale:?}");
}

#[tokio::test]
async fn failed_operation_does_not_poison_the_next() {
	let bridge = Bridge::with_parts(
		explicit("ws://10.0.0.5:9222/devtools/browser/x"),
		Arc::new(FakeDialer::new()),
		Arc::new(FakeLauncher::new()),
	)
	.unwrap();

	let err = bridge
		.execute(|_| async move { Err::<(), _>(Error::Config("operation failed".into())) })
		.await
		.unwrap_err();
	assert_eq!(err.code(), "CONFIG_ERROR");

	let info = bridge.connect().await.unwrap();
	assert_eq!(info.generation, 1);
}

#[tokio::test]
async fn current_instance_does_not_connect() {
	let dialer = Arc::new(FakeDialer::new());
	let bridge = Bridge::with_parts(explicit("ws://10.0.0.5:9222/devtools/browser/x"), dialer.clone(), Arc::new(FakeLauncher::new())).unwrap();

	assert!(bridge.current_instance().await.unwrap().is_none());
	assert_eq!(bridge.state().await.unwrap(), ConnectionState::Unconnected);
	assert!(dialer.connects().is_empty());

	bridge.connect().await.unwrap();
	let info = bridge.current_instance().await.unwrap().unwrap();
	assert_eq!(info.endpoint, "ws://10.0.0.5:9222/devtools/browser/x");

	bridge.disconnect().await.unwrap();
	assert_eq!(bridge.state().await.unwrap(), ConnectionState::Disconnected);
	assert!(bridge.current_instance().await.unwrap().is_none());
}

#[tokio::test]
async fn explicit_failure_through_bridge_never_launches() {
	let launcher = Arc::new(FakeLauncher::new());
	let bridge = Bridge::with_parts(
		explicit("http://10.0.0.5:9222"),
		Arc::new(FakeDialer::new()),
		launcher.clone(),
	)
	.unwrap();

	let err = bridge.connect().await.unwrap_err();
	assert_eq!(err.code(), "NO_CANDIDATES_SUCCEEDED");
	assert_eq!(launcher.launches(), 0);
}

#[tokio::test]
async fn connect_without_launch_ignores_launch_policy() {
	let dialer = Arc::new(FakeDialer::new());
	let launcher = Arc::new(FakeLauncher::new());
	let config = BridgeConfig::default();
	assert!(config.allow_launch);
	let bridge = Bridge::with_parts(config, dialer, launcher.clone()).unwrap();

	let err = bridge.connect_without_launch().await.unwrap_err();
	assert!(matches!(err, Error::NoCandidatesSucceeded { .. }), "{err:?}");
	assert_eq!(launcher.launches(), 0);
	assert!(bridge.connect_options().allow_launch);

	let info = bridge.connect().await.unwrap();
	assert_eq!(info.source, InstanceSource::Launched);
	assert_eq!(launcher.launches(), 1);
}

async fn fake_browser_socket(mut socket: WebSocket) {
	while let Some(Ok(message)) = socket.recv().await {
		let Message::Text(text) = message else {
			continue;
		};
		let Ok(request) = serde_json::from_str::<Value>(text.as_str()) else {
			continue;
		};
		let result = match request["method"].as_str().unwrap_or_default() {
			"Target.getTargets" => json!({
				"targetInfos": [{ "targetId": "P1", "type": "page", "title": "", "url": "about:blank", "attached": false }]
			}),
			"Target.attachToTarget" => json!({ "sessionId": "S-P1" }),
			"Browser.getVersion" => json!({ "product": "FakeChrome/2.0" }),
			_ => json!({}),
		};
		let mut reply = json!({ "id": request["id"], "result": result });
		if let Some(session) = request.get("sessionId") {
			reply["sessionId"] = session.clone();
		}
		if socket.send(Message::Text(reply.to_string().into())).await.is_err() {
			break;
		}
	}
}

async fn devtools(ws: WebSocketUpgrade) -> Response {
	ws.on_upgrade(fake_browser_socket)
}

/// Discovery and the control channel on one port, advertising an address
/// the client cannot use as-is.
async fn serve_fake_browser() -> SocketAddr {
	let router = Router::new()
		.route(
			"/json/version",
			get(|| async {
				axum::Json(json!({
					"Browser": "FakeChrome/2.0",
					"Protocol-Version": "1.3",
					"webSocketDebuggerUrl": "ws://0.0.0.0:1/devtools/browser/e2e"
				}))
			}),
		)
		.route("/devtools/browser/{id}", get(devtools));
	let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move {
		axum::serve(listener, router).await.unwrap();
	});
	addr
}

#[tokio::test]
async fn end_to_end_against_fake_browser() {
	let addr = serve_fake_browser().await;
	let launcher = Arc::new(FakeLauncher::new());
	let bridge = Bridge::with_parts(
		explicit(&format!("http://127.0.0.1:{}", addr.port())),
		Arc::new(crate::dialer::NetworkDialer::new().unwrap()),
		launcher.clone(),
	)
	.unwrap();

	let info = bridge.connect().await.unwrap();
	assert_eq!(info.endpoint, format!("ws://127.0.0.1:{}/devtools/browser/e2e", addr.port()));
	assert!(info.rewritten);
	assert_eq!(info.browser.as_deref(), Some("FakeChrome/2.0"));
	assert_eq!(info.page_session.as_deref(), Some("S-P1"));

	let version = bridge
		.execute(|session| async move { session.send("Browser.getVersion", json!({})).await })
		.await
		.unwrap();
	assert_eq!(version["product"], "FakeChrome/2.0");

	let page = bridge
		.execute(|session| async move { session.send_to_page("Runtime.evaluate", json!({ "expression": "1" })).await })
		.await
		.unwrap();
	assert_eq!(page, json!({}));

	bridge.shutdown().await.unwrap();
	assert_eq!(launcher.launches(), 0);
}
