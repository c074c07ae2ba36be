#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ExampleProxy, ExampleService, GUID};
use procbridge_rpc::{create_client, create_server, BridgeError};
use procbridge_transport::ConnectionDescriptor;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_and_client_over_socket_pair() {
    let (server, descriptor) = create_server(Arc::new(ExampleService::default())).unwrap();
    assert_eq!(server.descriptor(), &descriptor);
    let socket_dir = descriptor.inbound().parent().unwrap().to_path_buf();
    assert!(socket_dir.exists());

    // The descriptor crosses the process boundary as text.
    let parsed: ConnectionDescriptor = descriptor.to_string().parse().unwrap();
    let client = create_client::<ExampleProxy>(&parsed).unwrap();

    assert!(client
        .wait_for_connection(Some(Duration::from_secs(5)), true)
        .await
        .unwrap());
    assert!(server
        .wait_for_connection(Some(Duration::from_secs(5)), true)
        .await
        .unwrap());
    assert_eq!(server.transport_name(), "unix-socket-pair");

    let proxy = client.dispatch().clone();
    let (joined, thrown) = tokio::task::spawn_blocking(move || {
        (proxy.append_guid("AAA", "BBB"), proxy.throw_exception())
    })
    .await
    .unwrap();
    assert_eq!(joined.unwrap(), format!("AAA {GUID} BBB"));
    let thrown = thrown.unwrap_err();
    assert!(matches!(&thrown, BridgeError::Remote(fault)
        if fault.kind() == "AccessViolation" && fault.message() == "This is a test"));

    assert_eq!(client.dispatch().value_task(420).await.unwrap(), "420");
    assert!(client.dispatch().async_throw().await.is_err());

    client.dispose().await;
    server.dispose().await;
    assert!(!socket_dir.exists(), "socket directory removed on dispose");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn descriptor_admits_one_client() {
    let (server, descriptor) = create_server(Arc::new(ExampleService::default())).unwrap();
    let first = create_client::<ExampleProxy>(&descriptor).unwrap();
    first.wait_for_connection(None, true).await.unwrap();
    server.wait_for_connection(None, true).await.unwrap();

    // Listeners are gone once accepted, so a second client never connects.
    assert!(!descriptor.inbound().exists());
    assert!(!descriptor.outbound().exists());
    let second = create_client::<ExampleProxy>(&descriptor).unwrap();
    let connected = second
        .wait_for_connection(Some(Duration::from_millis(100)), false)
        .await
        .unwrap();
    assert!(!connected);

    second.dispose().await;
    first.dispose().await;
    server.dispose().await;
}
