//! Download behaviour against a local HTTP server.

mod common;

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::Path as UrlPath;
use axum::http::StatusCode;
use axum::routing::get;
use devrt_runtime::errors::TransferError;
use devrt_runtime::transfer::{self, MAX_REDIRECTS, TransferEvent, part_path};

use common::{found, serve, temp_test_dir};

const BODY: &[u8] = b"portable runtime bytes";

fn router() -> Router {
    Router::new()
        .route("/file.bin", get(|| async { BODY.to_vec() }))
        .route(
            "/redirect/{hops}",
            get(|UrlPath(hops): UrlPath<u32>| async move {
                if hops > 1 {
                    found(&format!("/redirect/{}", hops - 1))
                } else {
                    found("/file.bin")
                }
            }),
        )
        .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
        .route("/no-location", get(|| async { StatusCode::FOUND }))
}

#[tokio::test]
async fn plain_download_writes_exactly_one_file() {
    let server = serve(router()).await;
    let dir = temp_test_dir("plain");
    let dest = dir.join("nested").join("file.bin");

    let summary = transfer::download(&format!("{}/file.bin", server.base), &dest, None)
        .await
        .expect("Should download");

    assert_eq!(summary.bytes, BODY.len() as u64);
    assert_eq!(summary.redirects, 0);
    assert_eq!(std::fs::read(&dest).expect("Should read"), BODY);
    assert!(!part_path(&dest).exists());

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn redirect_yields_target_content() {
    let server = serve(router()).await;
    let dir = temp_test_dir("redirect");
    let dest = dir.join("file.bin");

    let events = Arc::new(Mutex::new(Vec::new()));
    let events_clone = Arc::clone(&events);
    let callback: transfer::TransferCallback =
        Arc::new(move |event| events_clone.lock().unwrap().push(event));

    let summary = transfer::download(&format!("{}/redirect/1", server.base), &dest, Some(callback))
        .await
        .expect("Should download");

    assert_eq!(summary.redirects, 1);
    assert!(summary.final_url.ends_with("/file.bin"));
    assert_eq!(std::fs::read(&dest).expect("Should read"), BODY);
    assert_eq!(std::fs::read_dir(&dir).expect("Should list").count(), 1);

    let events = events.lock().unwrap();
    assert!(matches!(events.first(), Some(TransferEvent::Redirected { .. })));
    assert!(matches!(
        events.last(),
        Some(TransferEvent::Completed { bytes }) if *bytes == BODY.len() as u64
    ));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn five_redirects_are_allowed() {
    let server = serve(router()).await;
    let dir = temp_test_dir("five");
    let dest = dir.join("file.bin");

    let summary = transfer::download(
        &format!("{}/redirect/{MAX_REDIRECTS}", server.base),
        &dest,
        None,
    )
    .await
    .expect("Should download");
    assert_eq!(summary.redirects, MAX_REDIRECTS);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn six_redirects_fail_without_residue() {
    let server = serve(router()).await;
    let dir = temp_test_dir("six");
    let dest = dir.join("file.bin");

    let err = transfer::download(&format!("{}/redirect/6", server.base), &dest, None)
        .await
        .expect_err("Should fail");

    assert!(matches!(err, TransferError::TooManyRedirects { limit: 5, .. }));
    assert!(!dest.exists());
    assert!(!part_path(&dest).exists());

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn http_error_reports_status_and_reports_failure() {
    let server = serve(router()).await;
    let dir = temp_test_dir("missing");
    let dest = dir.join("file.bin");

    let failed = Arc::new(Mutex::new(None));
    let failed_clone = Arc::clone(&failed);
    let callback: transfer::TransferCallback = Arc::new(move |event| {
        if let TransferEvent::Failed { error } = event {
            *failed_clone.lock().unwrap() = Some(error);
        }
    });

    let err = transfer::download(&format!("{}/missing", server.base), &dest, Some(callback))
        .await
        .expect_err("Should fail");

    assert_eq!(err.status(), Some(404));
    assert!(!dest.exists());
    assert!(failed.lock().unwrap().as_deref().is_some_and(|e| e.contains("404")));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn redirect_without_location_is_http_error() {
    let server = serve(router()).await;
    let dir = temp_test_dir("no_location");
    let dest = dir.join("file.bin");

    let err = transfer::download(&format!("{}/no-location", server.base), &dest, None)
        .await
        .expect_err("Should fail");
    assert_eq!(err.status(), Some(302));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn connection_refused_is_network_error() {
    let dir = temp_test_dir("refused");
    let dest = dir.join("file.bin");

    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Should bind");
        listener.local_addr().expect("Should have addr").port()
    };

    let err = transfer::download(&format!("http://127.0.0.1:{port}/file.bin"), &dest, None)
        .await
        .expect_err("Should fail");
    assert!(matches!(err, TransferError::Network { .. }));
    assert!(!dest.exists());

    let _ = std::fs::remove_dir_all(&dir);
}
