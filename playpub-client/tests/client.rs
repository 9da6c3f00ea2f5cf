use std::sync::Arc;
use std::time::Duration;

use playpub_client::{BuildUpload, ClientError, PollOptions, PublisherClient};
use chrono::Utc;
use playpub_core::domain::build::{BuildJob, BuildStatus, Transition};
use playpub_core::domain::config::BuildConfig;
use playpub_server::{
    api,
    config::ServerConfig,
    repository::{InMemoryJobStore, JobStore},
    service::BuildService,
};
use tempfile::TempDir;
use uuid::Uuid;

/// Starts a server on an ephemeral port and returns a client for it
async fn start_server(stage_delay: Duration) -> (PublisherClient, TempDir) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (client, uploads, _) =
        serve(listener, stage_delay, Arc::new(InMemoryJobStore::new())).await;
    (client, uploads)
}

async fn serve(
    listener: tokio::net::TcpListener,
    stage_delay: Duration,
    store: Arc<InMemoryJobStore>,
) -> (PublisherClient, TempDir, std::net::SocketAddr) {
    let uploads = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        upload_dir: uploads.path().to_path_buf(),
        stage_delay,
        ..ServerConfig::default()
    };

    let service = BuildService::from_config(&config, store);
    let router = api::create_router(Arc::new(service), config.max_upload_bytes);

    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (PublisherClient::new(format!("http://{}", addr)), uploads, addr)
}

/// Forwards connections to `target`, closing those `refuse` picks by index
async fn flaky_proxy(target: std::net::SocketAddr, refuse: fn(usize) -> bool) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        for index in 0usize.. {
            let Ok((mut inbound, _)) = listener.accept().await else {
                return;
            };
            if refuse(index) {
                continue;
            }
            tokio::spawn(async move {
                if let Ok(mut outbound) = tokio::net::TcpStream::connect(target).await {
                    let _ = tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await;
                }
            });
        }
    });

    format!("http://{}", addr)
}

/// A client that opens a fresh connection for every request
fn unpooled_client(base_url: String) -> PublisherClient {
    let http = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap();
    PublisherClient::with_client(base_url, http)
}

fn apk() -> BuildUpload {
    BuildUpload::new("app-release.apk", b"PK\x03\x04apk".to_vec())
}

fn keystore() -> Option<BuildUpload> {
    Some(BuildUpload::new("upload.jks", b"keystore".to_vec()))
}

fn fast_polling() -> PollOptions {
    PollOptions {
        interval: Duration::from_millis(10),
        max_transport_retries: 2,
        timeout: Some(Duration::from_secs(10)),
    }
}

#[tokio::test]
async fn test_submit_and_wait_for_completion() {
    let (client, _uploads) = start_server(Duration::from_millis(5)).await;

    let submitted = client
        .submit_build(&BuildConfig::new("Demo", 1), apk(), keystore(), Vec::new())
        .await
        .unwrap();
    assert_eq!(submitted.status, BuildStatus::Pending);

    let mut seen = Vec::new();
    let job = client
        .wait_for_build(submitted.build_id, &fast_polling(), |job| {
            seen.push(job.progress)
        })
        .await
        .unwrap();

    assert_eq!(job.status, BuildStatus::Completed);
    assert_eq!(job.progress, 100);
    assert!(job.output_ref.is_some());
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(seen.last(), Some(&100));

    let builds = client.list_builds().await.unwrap();
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].app_name, "Demo");
}

#[tokio::test]
async fn test_validation_detail_is_surfaced() {
    let (client, _uploads) = start_server(Duration::ZERO).await;

    let err = client
        .submit_build(&BuildConfig::new("", 1), apk(), keystore(), Vec::new())
        .await
        .unwrap_err();

    match err {
        ClientError::Api { status, detail } => {
            assert_eq!(status, 400);
            assert_eq!(detail, "appName is required");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_build_is_not_found() {
    let (client, _uploads) = start_server(Duration::ZERO).await;

    let err = client.get_build(Uuid::new_v4()).await.unwrap_err();
    assert!(err.is_not_found());

    // A 404 ends polling straight away.
    let err = client
        .wait_for_build(Uuid::new_v4(), &fast_polling(), |_| {})
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_cancel_and_delete() {
    let (client, _uploads) = start_server(Duration::from_millis(200)).await;

    let submitted = client
        .submit_build(&BuildConfig::new("Demo", 1), apk(), None, Vec::new())
        .await
        .unwrap();

    let job = client.cancel_build(submitted.build_id).await.unwrap();
    assert_eq!(job.status, BuildStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("cancelled"));

    let waited = client
        .wait_for_build(submitted.build_id, &fast_polling(), |_| {})
        .await
        .unwrap();
    assert_eq!(waited.status, BuildStatus::Failed);

    let message = client.delete_build(submitted.build_id).await.unwrap();
    assert_eq!(message, format!("Build {} deleted", submitted.build_id));
    assert!(client.get_build(submitted.build_id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_poller_gives_up_after_transport_retries() {
    // Bind then drop to get a port with nothing listening.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = PublisherClient::new(format!("http://{}", addr));
    let mut updates = 0;

    let err = client
        .wait_for_build(Uuid::new_v4(), &fast_polling(), |_| updates += 1)
        .await
        .unwrap_err();

    assert!(err.is_transport());
    assert_eq!(updates, 0);
}

#[tokio::test]
async fn test_poller_waits_for_server_to_come_up() {
    let reserved = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = reserved.local_addr().unwrap();
    drop(reserved);

    let store = Arc::new(InMemoryJobStore::new());
    let job = BuildJob::new(Uuid::new_v4(), BuildConfig::new("Demo", 1), Utc::now());
    let id = job.id;
    store.insert(job).await.unwrap();
    store.apply(id, Transition::Start).await.unwrap();
    store
        .apply(
            id,
            Transition::Complete {
                output_ref: "/tmp/app.aab".to_string(),
                message: "Done".to_string(),
            },
        )
        .await
        .unwrap();

    let client = PublisherClient::new(format!("http://{}", addr));
    let options = PollOptions {
        interval: Duration::from_millis(50),
        max_transport_retries: 20,
        timeout: Some(Duration::from_secs(10)),
    };
    let waiter = tokio::spawn(async move { client.wait_for_build(id, &options, |_| {}).await });

    tokio::time::sleep(Duration::from_millis(200)).await;
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let (_client, _uploads, _) = serve(listener, Duration::ZERO, store).await;

    let job = waiter.await.unwrap().unwrap();
    assert_eq!(job.id, id);
    assert_eq!(job.status, BuildStatus::Completed);
}

#[tokio::test]
async fn test_poller_budget_resets_between_failures() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (direct, _uploads, addr) =
        serve(listener, Duration::from_millis(100), Arc::new(InMemoryJobStore::new())).await;

    let submitted = direct
        .submit_build(&BuildConfig::new("Demo", 1), apk(), None, Vec::new())
        .await
        .unwrap();

    // Two failed connections before every good one: more failures in total
    // than the budget allows, never more in a row.
    let flaky = unpooled_client(flaky_proxy(addr, |index| index % 3 != 2).await);
    let mut updates = 0;

    let job = flaky
        .wait_for_build(submitted.build_id, &fast_polling(), |_| updates += 1)
        .await
        .unwrap();

    assert_eq!(job.status, BuildStatus::Completed);
    assert!(updates >= 2);
}

#[tokio::test]
async fn test_submit_with_extra_inputs() {
    let (client, uploads) = start_server(Duration::ZERO).await;

    let extra = vec![
        ("mapping".to_string(), BuildUpload::new("mapping.txt", b"a -> b".to_vec())),
        ("symbols".to_string(), BuildUpload::new("mapping.txt", b"sym".to_vec())),
    ];
    let submitted = client
        .submit_build(&BuildConfig::new("Demo", 1), apk(), keystore(), extra)
        .await
        .unwrap();

    let inputs = uploads.path().join(submitted.build_id.to_string()).join("inputs");
    assert_eq!(std::fs::read(inputs.join("mapping.txt")).unwrap(), b"a -> b");
    assert_eq!(std::fs::read(inputs.join("mapping-1.txt")).unwrap(), b"sym");

    let job = client
        .wait_for_build(submitted.build_id, &fast_polling(), |_| {})
        .await
        .unwrap();
    assert_eq!(job.status, BuildStatus::Completed);
}

#[tokio::test]
async fn test_extra_input_cannot_use_reserved_field() {
    let (client, _uploads) = start_server(Duration::ZERO).await;

    let extra = vec![("apkFile".to_string(), BuildUpload::new("other.apk", b"x".to_vec()))];
    let err = client
        .submit_build(&BuildConfig::new("Demo", 1), apk(), None, extra)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::InvalidRequest(_)));
    assert!(client.list_builds().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_download_artifact() {
    let (client, uploads) = start_server(Duration::ZERO).await;

    let submitted = client
        .submit_build(&BuildConfig::new("Demo", 1), apk(), keystore(), Vec::new())
        .await
        .unwrap();
    client
        .wait_for_build(submitted.build_id, &fast_polling(), |_| {})
        .await
        .unwrap();

    let artifact = client.download_artifact(submitted.build_id).await.unwrap();

    assert_eq!(artifact.file_name, "Demo.aab");
    let on_disk = std::fs::read(
        uploads
            .path()
            .join(submitted.build_id.to_string())
            .join("app.aab"),
    )
    .unwrap();
    assert_eq!(artifact.data, on_disk);
}

#[tokio::test]
async fn test_download_artifact_of_running_build() {
    let (client, _uploads) = start_server(Duration::from_millis(200)).await;

    let submitted = client
        .submit_build(&BuildConfig::new("Demo", 1), apk(), None, Vec::new())
        .await
        .unwrap();

    let err = client.download_artifact(submitted.build_id).await.unwrap_err();
    match err {
        ClientError::Api { status, detail } => {
            assert_eq!(status, 400);
            assert!(detail.contains("is not completed"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let err = client.download_artifact(Uuid::new_v4()).await.unwrap_err();
    assert!(err.is_not_found());
}
