//! Health reports, registration and removal over HTTP.

use axum::http::StatusCode;
use prost::Message;
use serde_json::{json, Value};

use code_server_proxy::health::{CodeServerStatus, HealthCheck};

mod common;
use common::{unused_port, HttpBackend, TestProxy};

#[tokio::test]
async fn test_healthcheck_reports_each_backend() {
    let live = HttpBackend::start("live").await;
    let dead = unused_port().await;
    let proxy = TestProxy::start().await;
    proxy.registry.register("/home/dev/proj1", "proj1", live.port).unwrap();
    proxy.registry.register("/home/dev/proj2", "proj2", dead).unwrap();

    for path in ["/", "/healthcheck"] {
        let res = reqwest::get(proxy.url(path)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();

        assert_eq!(body["CodeServerProxy"], "OK");
        let servers = body["CodeServers"].as_array().unwrap();
        assert_eq!(servers.len(), 2);

        assert_eq!(servers[0]["Port"], live.port);
        assert_eq!(servers[0]["State"], "OK");
        assert_eq!(servers[0]["Alias"], "proj1");
        assert_eq!(
            servers[0]["URL"],
            format!("https://{}/home/dev/proj1", proxy.addr)
        );
        assert_eq!(servers[0]["AliasURL"], format!("https://{}/proj1", proxy.addr));

        assert_eq!(servers[1]["State"], "NOT OK");
    }
}

#[tokio::test]
async fn test_healthcheck_with_no_backends() {
    let proxy = TestProxy::start().await;
    let body: Value = reqwest::get(proxy.url("/healthcheck"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["CodeServerProxy"], "OK");
    assert!(body["CodeServers"].as_array().map_or(true, Vec::is_empty));
}

#[tokio::test]
async fn test_binary_status() {
    let live = HttpBackend::start("live").await;
    let proxy = TestProxy::start().await;
    proxy.registry.register("/home/dev/proj1", "proj1", live.port).unwrap();

    let res = reqwest::get(proxy.url("/status")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()["content-type"].to_str().unwrap(),
        "application/x-protobuf"
    );
    let report = HealthCheck::decode(res.bytes().await.unwrap()).unwrap();
    assert_eq!(report.code_server_proxy, "OK");
    assert_eq!(report.code_servers.len(), 1);
    assert_eq!(report.code_servers[0].port, i64::from(live.port));
    assert!(report.code_servers[0].is_ok());

    let res = reqwest::get(proxy.url("/status/proj1")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let single = CodeServerStatus::decode(res.bytes().await.unwrap()).unwrap();
    assert_eq!(single.alias, "proj1");
    assert_eq!(single.alias_url, format!("https://{}/proj1", proxy.addr));

    let res = reqwest::get(proxy.url("/status/missing")).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_and_remove() {
    let backend = HttpBackend::start("one").await;
    let proxy = TestProxy::start().await;
    let client = reqwest::Client::new();

    let res = client
        .post(proxy.url("/register"))
        .json(&json!({
            "folder": "/home/dev/proj1",
            "name": "proj1",
            "port": backend.port.to_string(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(proxy.registry.len(), 1);

    let body = reqwest::get(proxy.url("/proj1/x")).await.unwrap().text().await.unwrap();
    assert_eq!(body, "one GET /x");

    let res = client.delete(proxy.url("/remove/proj1")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(proxy.registry.is_empty());

    let res = client.delete(proxy.url("/remove/proj1")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.text().await.unwrap(), "Code-server proj1 doesn't exist");
}

#[tokio::test]
async fn test_register_conflicts_and_bad_input() {
    let proxy = TestProxy::start().await;
    let client = reqwest::Client::new();
    let register = |body: Value| {
        let client = client.clone();
        let url = proxy.url("/register");
        async move { client.post(url).json(&body).send().await.unwrap() }
    };

    let res = register(json!({ "folder": "/a/one", "name": "proj1", "port": "9101" })).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = register(json!({ "folder": "/a/two", "name": "proj1", "port": "9102" })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.text().await.unwrap(), "Name proj1 is in use");

    let res = register(json!({ "folder": "/a/two", "name": "proj2", "port": "9101" })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = register(json!({ "folder": "/a/two", "name": "proj2", "port": "abc" })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(proxy.url("/register"))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    assert_eq!(proxy.registry.len(), 1);
}

#[tokio::test]
async fn test_registration_is_persisted() {
    let proxy = TestProxy::start().await;
    let client = reqwest::Client::new();

    client
        .post(proxy.url("/register"))
        .json(&json!({ "folder": "/home/dev/proj1", "name": "proj1", "port": "9201" }))
        .send()
        .await
        .unwrap();
    let contents = proxy.wait_for_file(|c| c.contains("proj1")).await;
    assert!(contents.contains("[[servers]]"));
    assert!(contents.contains("/home/dev/proj1"));

    client.delete(proxy.url("/remove/proj1")).send().await.unwrap();
    let contents = proxy.wait_for_file(|c| !c.contains("proj1")).await;
    assert!(!contents.contains("proj1"));
}

#[tokio::test]
async fn test_other_methods_on_management_paths_are_proxied() {
    let backend = HttpBackend::start("one").await;
    let proxy = TestProxy::start().await;
    proxy.registry.register("/srv/a/one", "one", backend.port).unwrap();

    let res = reqwest::Client::new()
        .post(proxy.url("/status"))
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "one POST /status");
}
