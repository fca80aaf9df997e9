mod common;

use common::{FakeStore, cluster_data};
use serde_json::json;
use stolon_admin::{
    cli::{
        cli::{CliConfig, Command},
        dispatcher::dispatch,
    },
    store::{
        client::{ClusterOperations, StoreClient},
        errors::ClientError,
        kv::StoreBackend,
        models::{Role, cluster_data_key},
    },
};

const KEY: &str = "stolon/cluster/main/clusterdata";

fn client_for(store: &FakeStore) -> StoreClient {
    let cfg = CliConfig {
        store_backend: Some(store.backend),
        store_endpoints: store.addr.to_string(),
        ..CliConfig::default()
    };
    StoreClient::new(&cfg).unwrap()
}

async fn seeded(backend: StoreBackend) -> FakeStore {
    let store = FakeStore::spawn(backend).await;
    store.insert(KEY, &cluster_data().to_string());
    store.insert(&cluster_data_key("analytics").unwrap(), "{}");
    store
}

#[tokio::test]
async fn etcd_patch_from_file_round_trips_through_the_store() {
    let store = seeded(StoreBackend::Etcd).await;
    let client = client_for(&store);

    let dir = tempfile::tempdir().unwrap();
    let patch = dir.path().join("patch.json");
    std::fs::write(&patch, br#"{"retention":"7d"}"#).unwrap();

    let mut out = Vec::new();
    dispatch(
        &client,
        Command::PatchConfig {
            cluster: "main".into(),
            file: Some(patch),
            read_stdin: false,
        },
        std::io::empty(),
        &mut out,
    )
    .await
    .unwrap();
    assert!(out.is_empty());

    let doc = store.json(KEY);
    assert_eq!(doc["cluster"]["spec"]["retention"], "7d");
    assert_eq!(doc["cluster"]["spec"]["sleepInterval"], "5s");
    assert_eq!(doc["cluster"]["status"]["master"], "db1");

    let config = client.config("main").await.unwrap();
    assert_eq!(config["retention"], "7d");
}

#[tokio::test]
async fn etcd_status_and_listing() {
    let store = seeded(StoreBackend::Etcd).await;
    let client = client_for(&store);

    let status = client.status("main").await.unwrap();
    assert_eq!(status.phase, "normal");
    let master = status.master_node().unwrap();
    assert_eq!(master.uid, "db1");
    assert_eq!(master.role, Role::Master);
    assert_eq!(master.address, "10.0.0.1:5432");

    assert_eq!(client.clusters().await.unwrap(), vec!["analytics", "main"]);
}

#[tokio::test]
async fn consul_replace_and_read_back() {
    let store = seeded(StoreBackend::Consul).await;
    let client = client_for(&store);

    client
        .replace_config("main", br#"{"sleepInterval":"10s"}"#)
        .await
        .unwrap();

    assert_eq!(
        client.config("main").await.unwrap(),
        json!({"sleepInterval": "10s"})
    );
    assert_eq!(store.json(KEY)["formatVersion"], 1);
    assert_eq!(client.clusters().await.unwrap(), vec!["analytics", "main"]);
}

#[tokio::test]
async fn missing_cluster_is_not_found() {
    for backend in [StoreBackend::Etcd, StoreBackend::Consul] {
        let store = FakeStore::spawn(backend).await;
        let client = client_for(&store);

        let err = client.config("ghost").await.unwrap_err();
        assert!(matches!(err, ClientError::ClusterNotFound(_)), "{backend}: {err}");
        assert!(client.clusters().await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn dead_endpoints_are_skipped() {
    let store = seeded(StoreBackend::Etcd).await;

    let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let cfg = CliConfig {
        store_backend: Some(StoreBackend::Etcd),
        store_endpoints: format!("{dead_addr},{}", store.addr),
        ..CliConfig::default()
    };
    let client = StoreClient::new(&cfg).unwrap();

    let status = client.status("main").await.unwrap();
    assert_eq!(status.nodes.len(), 2);
}

#[tokio::test]
async fn cluster_names_cannot_leave_the_cluster_prefix() {
    for backend in [StoreBackend::Etcd, StoreBackend::Consul] {
        let store = seeded(backend).await;
        store.insert("secrets/clusterdata", r#"{"cluster":{"spec":{"password":"x"}}}"#);
        let client = client_for(&store);

        for name in ["../../secrets", "main?raw", "main#frag", "..", "a%2Fb"] {
            let err = client.config(name).await.unwrap_err();
            assert!(
                matches!(err, ClientError::InvalidClusterName(_)),
                "{backend} {name:?}: {err}"
            );
            let err = client
                .replace_config(name, br#"{"pwned":true}"#)
                .await
                .unwrap_err();
            assert!(matches!(err, ClientError::InvalidClusterName(_)), "{backend} {name:?}");
        }

        assert_eq!(
            store.json("secrets/clusterdata")["cluster"]["spec"],
            json!({"password": "x"})
        );
        assert_eq!(store.json(KEY)["cluster"]["spec"]["sleepInterval"], "5s");
    }
}
