use hashledger_core::{Blockchain, ChainConfig};
use hashledger_node::{router, AppState};
use hashledger_storage::{open_store, Backend};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;

fn test_chain() -> Arc<Blockchain> {
    Arc::new(
        Blockchain::in_memory(ChainConfig {
            initial_difficulty: 1,
            ..ChainConfig::default()
        })
        .expect("chain"),
    )
}

/// Serve `state` on an ephemeral port and return its base URL.
async fn serve(state: AppState) -> anyhow::Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.expect("server");
    });
    Ok(format!("http://{addr}"))
}

async fn submit(client: &reqwest::Client, base: &str, body: Value) -> anyhow::Result<reqwest::Response> {
    Ok(client.post(format!("{base}/transactions")).json(&body).send().await?)
}

#[tokio::test]
async fn test_health_and_stats() -> anyhow::Result<()> {
    let base = serve(AppState::new(test_chain(), "node")).await?;
    let health: Value = reqwest::get(format!("{base}/health")).await?.json().await?;
    assert_eq!(health, json!({ "status": "ok" }));

    let stats: Value = reqwest::get(format!("{base}/stats")).await?.json().await?;
    assert_eq!(stats["height"], 0);
    assert_eq!(stats["blocks"], 1);
    assert_eq!(stats["difficulty"], 1);
    assert_eq!(stats["pending"], 0);
    assert_eq!(stats["durable"], false);
    Ok(())
}

#[tokio::test]
async fn test_submit_mine_and_query() -> anyhow::Result<()> {
    let chain = test_chain();
    let base = serve(AppState::new(Arc::clone(&chain), "node")).await?;
    let client = reqwest::Client::new();

    let res = submit(
        &client,
        &base,
        json!({ "sender": "alice", "recipient": "bob", "amount": 5, "metadata": { "memo": "rent" } }),
    )
    .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let tx: Value = res.json().await?;
    assert_eq!(tx["kind"], "transfer");
    assert_eq!(tx["amount"], 5.0);
    assert_eq!(tx["id"].as_str().map(str::len), Some(64));

    let pending: Value = reqwest::get(format!("{base}/mempool")).await?.json().await?;
    assert_eq!(pending.as_array().map(Vec::len), Some(1));

    let res = client
        .post(format!("{base}/mine"))
        .json(&json!({ "miner": "carol" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let block: Value = res.json().await?;
    assert_eq!(block["index"], 1);
    assert_eq!(block["transactions"][0]["id"], tx["id"]);
    assert_eq!(block["transactions"][1]["recipient"], "carol");

    let balance: Value = reqwest::get(format!("{base}/balance/bob")).await?.json().await?;
    assert_eq!(balance, json!({ "address": "bob", "balance": 5.0 }));
    let balance: Value = reqwest::get(format!("{base}/balance/carol")).await?.json().await?;
    assert_eq!(balance["balance"], 10.0);

    let history: Value = reqwest::get(format!("{base}/history/alice")).await?.json().await?;
    assert_eq!(history.as_array().map(Vec::len), Some(1));

    let valid: Value = reqwest::get(format!("{base}/chain/valid")).await?.json().await?;
    assert_eq!(valid, json!({ "valid": true }));
    assert_eq!(chain.block_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_mine_defaults_and_noop() -> anyhow::Result<()> {
    let chain = test_chain();
    let base = serve(AppState::new(Arc::clone(&chain), "default-miner")).await?;
    let client = reqwest::Client::new();

    let res = client.post(format!("{base}/mine")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await?, json!({ "status": "noop" }));
    assert_eq!(chain.block_count(), 1);

    submit(&client, &base, json!({ "sender": "a", "recipient": "b", "amount": 1 })).await?;
    let res = client.post(format!("{base}/mine")).send().await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(chain.get_balance("default-miner"), 10.0);
    Ok(())
}

#[tokio::test]
async fn test_invalid_submissions_are_rejected() -> anyhow::Result<()> {
    let chain = test_chain();
    let base = serve(AppState::new(Arc::clone(&chain), "node")).await?;
    let client = reqwest::Client::new();

    for body in [
        json!({ "recipient": "bob", "amount": 1 }),
        json!({ "sender": "alice", "recipient": "bob" }),
        json!({ "sender": "alice", "recipient": "bob", "amount": "ten" }),
        json!({ "sender": "alice", "recipient": "bob", "amount": -1 }),
        json!({ "sender": "", "recipient": "bob", "amount": 1 }),
        json!({ "sender": "network", "recipient": "bob", "amount": 1 }),
        json!({ "sender": "alice", "recipient": "bob", "amount": 1, "metadata": [1, 2] }),
    ] {
        let res = submit(&client, &base, body.clone()).await?;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "body {body}");
        let err: Value = res.json().await?;
        assert!(err["error"].is_string());
    }
    assert!(chain.mempool().is_empty());

    let res = client
        .post(format!("{base}/mine"))
        .json(&json!({ "miner": "  " }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_undecodable_transactions_get_json_errors() -> anyhow::Result<()> {
    let chain = test_chain();
    let base = serve(AppState::new(Arc::clone(&chain), "node")).await?;
    let client = reqwest::Client::new();

    let res = submit(&client, &base, json!({ "sender": 5, "recipient": "bob", "amount": 1 })).await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: Value = res.json().await?;
    assert!(err["error"].as_str().is_some_and(|m| m.starts_with("invalid transaction")));

    for body in ["", "not json", r#"{"sender": "alice""#] {
        let res = client
            .post(format!("{base}/transactions"))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "body {body:?}");
        let err: Value = res.json().await?;
        assert!(err["error"].is_string());
    }
    assert!(chain.mempool().is_empty());

    // No content type: the body is still read as JSON.
    let res = client
        .post(format!("{base}/transactions"))
        .body(r#"{"sender": "alice", "recipient": "bob", "amount": 2}"#)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(chain.mempool().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_chain_tail_is_capped() -> anyhow::Result<()> {
    let chain = test_chain();
    let base = serve(AppState::new(Arc::clone(&chain), "node")).await?;
    let client = reqwest::Client::new();
    for i in 0..3 {
        submit(&client, &base, json!({ "sender": "a", "recipient": "b", "amount": i })).await?;
        client.post(format!("{base}/mine")).send().await?;
    }

    let tail: Value = reqwest::get(format!("{base}/chain/tail?n=2")).await?.json().await?;
    let indices: Vec<u64> = tail
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|b| b["index"].as_u64())
        .collect();
    assert_eq!(indices, vec![2, 3]);

    let tail: Value = reqwest::get(format!("{base}/chain/tail")).await?.json().await?;
    assert_eq!(tail.as_array().map(Vec::len), Some(4));
    let tail: Value = reqwest::get(format!("{base}/chain/tail?n=100000")).await?.json().await?;
    assert_eq!(tail.as_array().map(Vec::len), Some(4));

    let all: Value = reqwest::get(format!("{base}/chain")).await?.json().await?;
    assert_eq!(all.as_array().map(Vec::len), Some(4));
    Ok(())
}

#[tokio::test]
async fn test_shutdown_interrupts_mining() -> anyhow::Result<()> {
    let chain = test_chain();
    let base = serve(AppState::new(Arc::clone(&chain), "node")).await?;
    let client = reqwest::Client::new();
    submit(&client, &base, json!({ "sender": "a", "recipient": "b", "amount": 1 })).await?;

    chain.request_shutdown();
    let res = client.post(format!("{base}/mine")).send().await?;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(chain.mempool().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_auto_mine_threshold() -> anyhow::Result<()> {
    let chain = test_chain();
    let state = AppState {
        auto_mine_threshold: 3,
        ..AppState::new(Arc::clone(&chain), "auto")
    };
    let base = serve(state).await?;
    let client = reqwest::Client::new();
    for i in 0..3 {
        submit(&client, &base, json!({ "sender": "a", "recipient": "b", "amount": i })).await?;
    }
    for _ in 0..100 {
        if chain.block_count() == 2 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(chain.block_count(), 2);
    assert_eq!(chain.get_balance("auto"), 10.0);
    Ok(())
}

#[tokio::test]
async fn test_durable_node_survives_restart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = ChainConfig {
        initial_difficulty: 1,
        ..ChainConfig::default()
    };
    let client = reqwest::Client::new();
    {
        let chain = Arc::new(Blockchain::open(config.clone(), open_store(Backend::Json, dir.path())?)?);
        let base = serve(AppState::new(Arc::clone(&chain), "node")).await?;
        submit(&client, &base, json!({ "sender": "a", "recipient": "b", "amount": 2 })).await?;
        let res = client.post(format!("{base}/mine")).send().await?;
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let chain = Arc::new(Blockchain::open(config, open_store(Backend::Json, dir.path())?)?);
    let base = serve(AppState::new(chain, "node")).await?;
    let stats: Value = reqwest::get(format!("{base}/stats")).await?.json().await?;
    assert_eq!(stats["blocks"], 2);
    assert_eq!(stats["durable"], true);
    let balance: Value = reqwest::get(format!("{base}/balance/b")).await?.json().await?;
    assert_eq!(balance["balance"], 2.0);
    Ok(())
}
