use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use healthres_core::traits::VectorStore;
use healthres_core::types::{DocumentMeta, IndexHandle, IndexSpec, Metric, Placement, VectorRecord};
use healthres_core::Error;
use healthres_vector::pinecone::META_NAMESPACE;
use healthres_vector::{upsert_batched, PineconeStore};

fn store(server: &MockServer) -> PineconeStore {
    PineconeStore::new("pc-key", &server.uri(), Duration::from_secs(5))
        .expect("store")
        .with_ready_poll(Duration::from_millis(10), 5)
}

fn spec(dimension: usize) -> IndexSpec {
    IndexSpec { name: "mh".into(), dimension, metric: Metric::Cosine, placement: Placement::default() }
}

fn description(server: &MockServer, dimension: usize, ready: bool) -> serde_json::Value {
    json!({
        "name": "mh",
        "dimension": dimension,
        "metric": "cosine",
        "host": server.uri(),
        "status": { "ready": ready, "state": if ready { "Ready" } else { "Initializing" } },
    })
}

fn described_with_metric(server: &MockServer, metric: &str) -> serde_json::Value {
    let mut desc = description(server, 768, true);
    desc["metric"] = json!(metric);
    desc
}

fn handle(server: &MockServer) -> IndexHandle {
    IndexHandle { name: "mh".into(), dimension: 3, metric: Metric::Cosine, host: Some(server.uri()) }
}

#[tokio::test]
async fn missing_index_is_created_with_serverless_placement() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/mh"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/indexes"))
        .and(header("Api-Key", "pc-key"))
        .and(body_partial_json(json!({
            "name": "mh", "dimension": 768, "metric": "cosine",
            "spec": { "serverless": { "cloud": "aws", "region": "us-east-1" } }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(description(&server, 768, false)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/indexes/mh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(description(&server, 768, true)))
        .mount(&server)
        .await;

    let handle = store(&server).ensure_index(&spec(768)).await?;
    assert_eq!(handle.dimension, 768);
    assert_eq!(handle.host.as_deref(), Some(server.uri().as_str()));
    Ok(())
}

#[tokio::test]
async fn existing_index_is_reused_without_create() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/mh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(description(&server, 768, true)))
        .mount(&server)
        .await;
    Mock::given(method("POST")).and(path("/indexes")).respond_with(ResponseTemplate::new(201)).expect(0).mount(&server).await;

    let pc = store(&server);
    let a = pc.ensure_index(&spec(768)).await?;
    let b = pc.ensure_index(&spec(768)).await?;
    assert_eq!(a, b);
    Ok(())
}

#[tokio::test]
async fn dimension_mismatch_fails_without_delete() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/mh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(description(&server, 1024, true)))
        .mount(&server)
        .await;
    Mock::given(method("DELETE")).respond_with(ResponseTemplate::new(202)).expect(0).mount(&server).await;

    let err = store(&server).ensure_index(&spec(768)).await.unwrap_err();
    assert!(matches!(err, Error::IndexConfigMismatch { .. }), "{err}");
}

#[tokio::test]
async fn metric_mismatch_fails_on_reuse() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/mh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(described_with_metric(&server, "euclidean")))
        .mount(&server)
        .await;
    Mock::given(method("POST")).and(path("/indexes")).respond_with(ResponseTemplate::new(201)).expect(0).mount(&server).await;

    let err = store(&server).ensure_index(&spec(768)).await.unwrap_err();
    match err {
        Error::IndexConfigMismatch { detail, .. } => assert!(detail.contains("metric"), "{detail}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn concurrently_created_index_is_still_checked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/mh"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/indexes"))
        .respond_with(ResponseTemplate::new(409).set_body_string("ALREADY_EXISTS"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/indexes/mh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(described_with_metric(&server, "euclidean")))
        .mount(&server)
        .await;

    let err = store(&server).ensure_index(&spec(768)).await.unwrap_err();
    assert!(matches!(err, Error::IndexConfigMismatch { .. }), "{err}");
}

#[tokio::test]
async fn upsert_sends_ids_values_and_metadata() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .and(body_partial_json(json!({
            "vectors": [{
                "id": "0",
                "values": [1.0, 0.0, 0.0],
                "metadata": { "Abstract": "Sleep study", "Authors": "Smith J", "Publication Year": 2019 }
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "upsertedCount": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    let record = VectorRecord {
        id: "0".into(),
        vector: vec![1.0, 0.0, 0.0],
        meta: DocumentMeta { abstract_text: "Sleep study".into(), authors: "Smith J".into(), publication_year: 2019 },
    };
    let report = upsert_batched(&store(&server), &handle(&server), &[record], 128).await?;
    assert_eq!(report.batches, vec![1]);
    Ok(())
}

#[tokio::test]
async fn rejected_batch_surfaces_offset() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Vector dimension 2 does not match the dimension of the index 3"))
        .mount(&server)
        .await;

    let record = VectorRecord {
        id: "0".into(),
        vector: vec![0.0, 0.0, 1.0],
        meta: DocumentMeta { abstract_text: "a".into(), authors: "b".into(), publication_year: 2000 },
    };
    let err = upsert_batched(&store(&server), &handle(&server), &[record], 128).await.unwrap_err();
    assert_eq!(err.batch_offset(), Some(0));
    assert!(err.to_string().contains("HTTP 400"), "{err}");
}

#[tokio::test]
async fn query_maps_matches_to_ranked_results() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_partial_json(json!({ "topK": 5, "includeMetadata": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "matches": [
                { "id": "4", "score": 0.71, "metadata": { "Abstract": "b", "Authors": "y", "Publication Year": "2020" } },
                { "id": "2", "score": 0.93, "metadata": { "Abstract": "a", "Authors": "x", "Publication Year": 2018.0 } }
            ]
        })))
        .mount(&server)
        .await;

    let hits = store(&server).query(&handle(&server), &[0.1, 0.2, 0.3], 5).await?;
    assert_eq!(hits.iter().map(|h| h.document_id).collect::<Vec<_>>(), vec![2, 4]);
    assert_eq!(hits[0].metadata.publication_year, 2018);
    assert_eq!(hits[1].metadata.publication_year, 2020);
    Ok(())
}

#[tokio::test]
async fn count_reads_index_stats() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/describe_index_stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "dimension": 3,
            "totalVectorCount": 300,
            "namespaces": { "papers": { "vectorCount": 120 } }
        })))
        .mount(&server)
        .await;

    assert_eq!(store(&server).count(&handle(&server)).await?, 300);
    assert_eq!(store(&server).with_namespace("papers").count(&handle(&server)).await?, 120);
    Ok(())
}

#[tokio::test]
async fn default_namespace_count_excludes_bookkeeping() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/describe_index_stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalVectorCount": 301,
            "namespaces": { "": { "vectorCount": 300 }, META_NAMESPACE: { "vectorCount": 1 } }
        })))
        .mount(&server)
        .await;

    assert_eq!(store(&server).count(&handle(&server)).await?, 300);
    Ok(())
}

#[tokio::test]
async fn unauthorized_is_a_store_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/mh"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API Key"))
        .mount(&server)
        .await;

    let err = store(&server).ensure_index(&spec(768)).await.unwrap_err();
    match err {
        Error::VectorStore(msg) => assert!(msg.starts_with("HTTP 401"), "{msg}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn provenance_round_trips_through_the_meta_namespace() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vectors/fetch"))
        .and(query_param("ids", "provenance"))
        .and(query_param("namespace", META_NAMESPACE))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "vectors": {}, "namespace": META_NAMESPACE })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .and(body_partial_json(json!({
            "namespace": META_NAMESPACE,
            "vectors": [{ "id": "provenance", "values": [1.0, 0.0, 0.0], "metadata": { "provenance": "embed-v1@abc" } }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "upsertedCount": 1 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/vectors/fetch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "vectors": { "provenance": { "id": "provenance", "values": [1.0, 0.0, 0.0], "metadata": { "provenance": "embed-v1@abc" } } }
        })))
        .mount(&server)
        .await;

    let pc = store(&server);
    let index = handle(&server);
    assert_eq!(pc.provenance(&index).await?, None);
    pc.set_provenance(&index, "embed-v1@abc").await?;
    assert_eq!(pc.provenance(&index).await?.as_deref(), Some("embed-v1@abc"));
    Ok(())
}

#[tokio::test]
async fn clear_deletes_the_data_namespace() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vectors/delete"))
        .and(body_partial_json(json!({ "deleteAll": true, "namespace": "papers" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    store(&server).with_namespace("papers").clear(&handle(&server)).await?;
    Ok(())
}
