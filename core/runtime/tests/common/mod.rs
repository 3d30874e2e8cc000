//! Shared fixtures: a local HTTP server and archive builders.

#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};

/// Running fixture server.
pub struct FixtureServer {
    /// `http://127.0.0.1:<port>`
    pub base: String,
    hits: Arc<AtomicUsize>,
}

impl FixtureServer {
    /// Number of requests served so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn count_hits(State(hits): State<Arc<AtomicUsize>>, request: Request, next: Next) -> Response {
    hits.fetch_add(1, Ordering::SeqCst);
    next.run(request).await
}

/// Serves `router` on an ephemeral port, counting every request.
pub async fn serve(router: Router) -> FixtureServer {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = router.layer(middleware::from_fn_with_state(Arc::clone(&hits), count_hits));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Should bind fixture server");
    let addr = listener.local_addr().expect("Should have local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Fixture server failed");
    });

    FixtureServer {
        base: format!("http://{addr}"),
        hits,
    }
}

/// A 302 response pointing at `location`.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Creates a fresh temporary directory.
pub fn temp_test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("devrt_it_{}_{}", name, rand::random::<u64>()));
    std::fs::create_dir_all(&dir).expect("Should create temp dir");
    dir
}

fn append_all<W: Write>(builder: &mut tar::Builder<W>, files: &[(&str, &[u8], u32)]) {
    for (path, content, mode) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(*mode);
        header.set_cksum();
        builder
            .append_data(&mut header, path, *content)
            .expect("Should append file");
    }
}

/// Builds a tar.gz in memory.
pub fn tar_gz(files: &[(&str, &[u8], u32)]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    append_all(&mut builder, files);
    builder
        .into_inner()
        .expect("Should finish tar")
        .finish()
        .expect("Should finish gzip")
}

/// Builds a tar.xz in memory.
pub fn tar_xz(files: &[(&str, &[u8], u32)]) -> Vec<u8> {
    let encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
    let mut builder = tar::Builder::new(encoder);
    append_all(&mut builder, files);
    builder
        .into_inner()
        .expect("Should finish tar")
        .finish()
        .expect("Should finish xz")
}

/// Builds a ZIP in memory.
pub fn zip(files: &[(&str, &[u8], u32)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (path, content, mode) in files {
        let options = zip::write::SimpleFileOptions::default().unix_permissions(*mode);
        writer.start_file(*path, options).expect("Should start file");
        writer.write_all(content).expect("Should write");
    }
    writer.finish().expect("Should finish zip").into_inner()
}

/// Fake `npm` that "installs" a global `ng` into `$npm_config_prefix/bin`.
pub const FAKE_NPM: &[u8] = b"#!/bin/sh
echo \"npm $*\"
echo \"warn: fake registry\" >&2
mkdir -p \"$npm_config_prefix/bin\"
printf '#!/bin/sh\\necho ng\\n' > \"$npm_config_prefix/bin/ng\"
chmod +x \"$npm_config_prefix/bin/ng\"
";

/// Fake `npm` that fails like a registry outage.
pub const FAILING_NPM: &[u8] = b"#!/bin/sh
echo \"npm ERR! network\" >&2
exit 7
";

/// Fake `npm` that exits cleanly without installing anything.
pub const SILENT_NPM: &[u8] = b"#!/bin/sh
echo \"up to date\"
";
