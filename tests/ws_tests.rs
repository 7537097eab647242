use std::time::Duration;

use axum::Router;
use futures_util::StreamExt;
use order_book_engine::{
    api::{WsFrame, router},
    engine::AppState,
    instrument::Symbol,
    risk::RiskLimits,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::connect_async;

async fn spawn_server() -> (String, AppState, tokio::task::JoinHandle<()>) {
    let state = AppState::new(Symbol::new("BTC-USD"), 1.0, RiskLimits::default());
    let app: Router = router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base = format!("http://{}", addr);

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let ok = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Ok(r) = client.get(format!("{}/health", base)).send().await {
                if r.status().is_success() {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .is_ok();
    assert!(ok, "server did not become ready in time");

    (base, state, handle)
}

async fn recv_text(ws: &mut (impl StreamExt<Item = Result<tokio_tungstenite::tungstenite::Message, tokio_tungstenite::tungstenite::Error>> + Unpin)) -> String {
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("ws recv timeout")
        .expect("ws closed")
        .expect("ws error");
    match msg {
        tokio_tungstenite::tungstenite::Message::Text(t) => t.to_string(),
        other => panic!("expected text frame, got {:?}", other),
    }
}

#[tokio::test]
async fn market_data_socket_sends_initial_snapshot_then_updates() {
    let (http_base, _state, server) = spawn_server().await;
    let ws_url = http_base.replace("http://", "ws://") + "/ws/md";

    let (mut ws, _resp) = connect_async(&ws_url).await.expect("ws connect");

    let text = recv_text(&mut ws).await;
    let frame: WsFrame = serde_json::from_str(&text).expect("parse WsFrame");
    match frame {
        WsFrame::Snapshot(_) => {}
        WsFrame::Fill(_) => panic!("expected initial snapshot frame"),
    }

    server.abort();
}

#[tokio::test]
async fn fills_socket_delivers_fill_for_taker() {
    let (http_base, _state, server) = spawn_server().await;
    let client = reqwest::Client::new();

    let maker = json!({
        "client_id": "maker",
        "side": "sell",
        "type": "limit",
        "price": 50.0,
        "size": 5
    });
    client
        .post(format!("{}/order", http_base))
        .json(&maker)
        .send()
        .await
        .unwrap();

    let ws_url = http_base.replace("http://", "ws://") + "/ws/fills/taker";
    let (mut ws, _resp) = connect_async(&ws_url).await.expect("ws connect");

    let taker = json!({
        "client_id": "taker",
        "side": "buy",
        "type": "market",
        "size": 5
    });
    client
        .post(format!("{}/order", http_base))
        .json(&taker)
        .send()
        .await
        .unwrap();

    let text = recv_text(&mut ws).await;
    let frame: WsFrame = serde_json::from_str(&text).expect("parse WsFrame");
    match frame {
        WsFrame::Fill(fill) => {
            assert_eq!(fill.client_id, "taker");
            assert_eq!(fill.price, 50.0); // tick_size is 1.0 in this test, so ticks == dollars
            assert_eq!(fill.size, 5);
        }
        WsFrame::Snapshot(_) => panic!("expected a fill frame"),
    }

    server.abort();
}
