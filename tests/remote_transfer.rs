//! COPY/MOVE onto a WebDAV server, against an in-process mock server.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use davcopy::{
    ActionStatus, DeadProperty, Destination, Error, MemoryFileSystem, PropertyName, PropertyStore,
    RemoteClient, TransferBuilder, TransferOutcome,
};
use reqwest::Body;
use http::Version;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Collection,
    Document(Bytes),
}

#[derive(Debug, Default)]
struct Dav {
    nodes: BTreeMap<String, Node>,
    /// Paths whose PUT is answered with 403
    forbidden: BTreeSet<String>,
    /// PROPPATCH bodies by path
    proppatches: BTreeMap<String, String>,
    /// `Overwrite` header of the last PUT by path
    put_overwrite: BTreeMap<String, Option<String>>,
    log: Vec<String>,
}

#[derive(Clone, Default)]
struct MockDav(Arc<Mutex<Dav>>);

impl MockDav {
    fn new() -> Self {
        let mock = Self::default();
        mock.lock().nodes.insert("/".into(), Node::Collection);
        mock
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Dav> {
        self.0.lock().unwrap()
    }

    fn mkdir(&self, path: &str) {
        self.lock().nodes.insert(path.into(), Node::Collection);
    }

    fn put(&self, path: &str, content: &'static str) {
        self.lock()
            .nodes
            .insert(path.into(), Node::Document(Bytes::from_static(content.as_bytes())));
    }

    fn forbid(&self, path: &str) {
        self.lock().forbidden.insert(path.into());
    }

    fn content(&self, path: &str) -> Option<Bytes> {
        match self.lock().nodes.get(path) {
            Some(Node::Document(content)) => Some(content.clone()),
            _ => None,
        }
    }

    fn is_collection(&self, path: &str) -> bool {
        self.lock().nodes.get(path) == Some(&Node::Collection)
    }

    fn log(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    fn put_overwrite(&self, path: &str) -> Option<String> {
        self.lock().put_overwrite.get(path).cloned().flatten()
    }

    /// Serve on an ephemeral port and return the base URL.
    async fn serve(&self) -> Url {
        let app = Router::new().fallback(handle).with_state(self.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{addr}/")).unwrap()
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".into()
    } else {
        trimmed.into()
    }
}

fn parent(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/".into(),
        Some((parent, _)) => parent.into(),
    }
}

fn xml(status: StatusCode, body: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
        body,
    )
        .into_response()
}

fn propfind(href: &str, collection: bool) -> String {
    let resourcetype = if collection { "<D:collection/>" } else { "" };
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><D:multistatus xmlns:D="DAV:"><D:response><D:href>{href}</D:href><D:propstat><D:prop><D:resourcetype>{resourcetype}</D:resourcetype></D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response></D:multistatus>"#
    )
}

async fn handle(
    State(mock): State<MockDav>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = normalize(uri.path());
    let mut dav = mock.lock();
    dav.log.push(format!("{method} {}", uri.path()));

    match method.as_str() {
        "PROPFIND" => match dav.nodes.get(&path) {
            None => StatusCode::NOT_FOUND.into_response(),
            Some(node) => xml(
                StatusCode::MULTI_STATUS,
                propfind(uri.path(), *node == Node::Collection),
            ),
        },
        "PUT" => {
            if dav.forbidden.contains(&path) {
                return StatusCode::FORBIDDEN.into_response();
            }
            if dav.nodes.get(&parent(&path)) != Some(&Node::Collection) {
                return StatusCode::CONFLICT.into_response();
            }
            let overwrite = headers
                .get("Overwrite")
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);
            dav.put_overwrite.insert(path.clone(), overwrite.clone());
            if overwrite.as_deref() == Some("F") && dav.nodes.contains_key(&path) {
                return StatusCode::PRECONDITION_FAILED.into_response();
            }
            match dav.nodes.insert(path, Node::Document(body)) {
                None => StatusCode::CREATED.into_response(),
                Some(_) => StatusCode::NO_CONTENT.into_response(),
            }
        }
        "MKCOL" => {
            if dav.nodes.contains_key(&path) {
                return StatusCode::METHOD_NOT_ALLOWED.into_response();
            }
            if dav.nodes.get(&parent(&path)) != Some(&Node::Collection) {
                return StatusCode::CONFLICT.into_response();
            }
            dav.nodes.insert(path, Node::Collection);
            StatusCode::CREATED.into_response()
        }
        "DELETE" => {
            if dav.nodes.remove(&path).is_none() {
                return StatusCode::NOT_FOUND.into_response();
            }
            let prefix = format!("{path}/");
            dav.nodes.retain(|key, _| !key.starts_with(&prefix));
            StatusCode::NO_CONTENT.into_response()
        }
        "PROPPATCH" => {
            if !dav.nodes.contains_key(&path) {
                return StatusCode::NOT_FOUND.into_response();
            }
            dav.proppatches
                .insert(path, String::from_utf8_lossy(&body).into_owned());
            xml(
                StatusCode::MULTI_STATUS,
                format!(
                    r#"<?xml version="1.0" encoding="utf-8"?><D:multistatus xmlns:D="DAV:"><D:response><D:href>{}</D:href><D:propstat><D:prop/><D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response></D:multistatus>"#,
                    uri.path()
                ),
            )
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

fn source_tree() -> MemoryFileSystem {
    let fs = MemoryFileSystem::new();
    fs.write("/src/a.txt", "alpha").unwrap();
    fs.write("/src/b.txt", "beta").unwrap();
    fs.write("/src/sub/c.txt", "gamma").unwrap();
    fs
}

async fn run_copy(
    fs: &MemoryFileSystem,
    source: &str,
    destination: Url,
) -> davcopy::Result<TransferOutcome> {
    let client = RemoteClient::new()?;
    TransferBuilder::copy(
        Arc::new(fs.clone()),
        source,
        Destination::remote(client, destination),
    )
    .run()
    .await
}

fn statuses(outcome: &TransferOutcome) -> Vec<(String, ActionStatus)> {
    outcome
        .flatten()
        .map(|r| (r.href.path().to_owned(), r.status))
        .collect()
}

#[tokio::test]
async fn test_copy_collection_to_server() {
    let mock = MockDav::new();
    let base = mock.serve().await;
    let fs = source_tree();

    let outcome = run_copy(&fs, "/src", base.join("dst").unwrap())
        .await
        .unwrap();

    assert_eq!(outcome.failure_count(), 0);
    assert_eq!(
        statuses(&outcome),
        [
            ("/dst/".to_owned(), ActionStatus::Created),
            ("/dst/a.txt".to_owned(), ActionStatus::Created),
            ("/dst/b.txt".to_owned(), ActionStatus::Created),
            ("/dst/sub/".to_owned(), ActionStatus::Created),
            ("/dst/sub/c.txt".to_owned(), ActionStatus::Created),
        ]
    );
    assert!(mock.is_collection("/dst/sub"));
    assert_eq!(mock.content("/dst/sub/c.txt").unwrap(), "gamma");
    assert!(mock.log().contains(&"MKCOL /dst/".to_owned()));
    assert!(mock.log().contains(&"PUT /dst/a.txt".to_owned()));

    let response = outcome.evaluate(Version::HTTP_11).unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_copy_overwrites_remote_document() {
    let mock = MockDav::new();
    mock.mkdir("/dst");
    mock.put("/dst/a.txt", "stale");
    let base = mock.serve().await;
    let fs = source_tree();

    let outcome = run_copy(&fs, "/src", base.join("dst").unwrap())
        .await
        .unwrap();

    let results = statuses(&outcome);
    assert_eq!(results[0], ("/dst/".to_owned(), ActionStatus::Overwritten));
    assert_eq!(results[1], ("/dst/a.txt".to_owned(), ActionStatus::Overwritten));
    assert_eq!(results[2], ("/dst/b.txt".to_owned(), ActionStatus::Created));
    assert_eq!(mock.content("/dst/a.txt").unwrap(), "alpha");
    assert_eq!(mock.put_overwrite("/dst/a.txt").as_deref(), Some("T"));
    assert_eq!(mock.put_overwrite("/dst/b.txt").as_deref(), Some("T"));

    let response = outcome.evaluate(Version::HTTP_11).unwrap();
    assert_eq!(response.status(), StatusCode::MULTI_STATUS);
    assert_eq!(response.body().unwrap().matches("<D:response>").count(), 2);
}

#[tokio::test]
async fn test_move_keeps_source_when_upload_fails() {
    let mock = MockDav::new();
    mock.forbid("/dst/b.txt");
    let base = mock.serve().await;
    let fs = source_tree();

    let outcome = TransferBuilder::moving(
        Arc::new(fs.clone()),
        "/src",
        Destination::remote(RemoteClient::new().unwrap(), base.join("dst").unwrap()),
    )
    .run()
    .await
    .unwrap();

    let TransferOutcome::Collection(tree) = &outcome else {
        panic!("expected collection outcome");
    };
    assert_eq!(tree.status(), ActionStatus::Created);
    assert_eq!(tree.documents[0].status, ActionStatus::Created);
    assert_eq!(tree.documents[1].status, ActionStatus::CreateFailed);
    assert!(matches!(
        tree.documents[1].error,
        Some(Error::RemoteStatus {
            status: StatusCode::FORBIDDEN,
            ..
        })
    ));

    // Uploaded items are gone from the source, the rest stays
    assert!(!fs.exists("/src/a.txt"));
    assert!(fs.exists("/src/b.txt"));
    assert!(!fs.exists("/src/sub"));
    assert!(fs.exists("/src"));
    assert_eq!(mock.content("/dst/sub/c.txt").unwrap(), "gamma");
}

#[tokio::test]
async fn test_dead_properties_sent_with_proppatch() {
    let mock = MockDav::new();
    let base = mock.serve().await;
    let fs = MemoryFileSystem::new();
    fs.write("/a.txt", "alpha").unwrap();
    fs.properties()
        .unwrap()
        .set(
            "/a.txt",
            DeadProperty::new(PropertyName::new("urn:example", "author"), "Ada"),
        )
        .await
        .unwrap();

    let outcome = run_copy(&fs, "/a.txt", base.join("a.txt").unwrap())
        .await
        .unwrap();

    assert_eq!(outcome.root().status, ActionStatus::Created);
    let body = mock.lock().proppatches.get("/a.txt").cloned().unwrap();
    assert!(body.contains("urn:example"));
    assert!(body.contains(">Ada<"));
    // Servers compute their own ETags
    assert!(!body.contains("getetag"));
}

#[tokio::test]
async fn test_missing_remote_parent() {
    let mock = MockDav::new();
    let base = mock.serve().await;
    let fs = source_tree();

    let err = run_copy(&fs, "/src/a.txt", base.join("nope/a.txt").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ParentNotFound(_)));
    assert!(mock.log().iter().all(|line| !line.starts_with("PUT")));
}

#[tokio::test]
async fn test_put_without_overwrite_keeps_existing_document() {
    let mock = MockDav::new();
    mock.put("/a.txt", "original");
    let base = mock.serve().await;
    let client = RemoteClient::new().unwrap();
    let url = base.join("a.txt").unwrap();

    let err = client
        .put(&url, Body::from("replacement"), false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::RemoteStatus {
            status: StatusCode::PRECONDITION_FAILED,
            ..
        }
    ));
    assert_eq!(mock.put_overwrite("/a.txt").as_deref(), Some("F"));
    assert_eq!(mock.content("/a.txt").unwrap(), "original");

    let created = client
        .put(&base.join("b.txt").unwrap(), Body::from("new"), true)
        .await
        .unwrap();
    assert!(created);
    assert_eq!(mock.put_overwrite("/b.txt").as_deref(), Some("T"));
}
