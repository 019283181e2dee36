//! In-process WebDAV endpoint for storage tests.
//!
//! Answers just enough of the protocol for OpenDAL writes: `PROPFIND` finds
//! nothing, `MKCOL` always succeeds and `PUT` bodies are kept by path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode, Uri};

type Objects = Arc<Mutex<HashMap<String, Vec<u8>>>>;

pub(crate) struct DavServer {
    endpoint: String,
    objects: Objects,
    puts: Arc<Mutex<usize>>,
}

impl DavServer {
    pub(crate) async fn spawn() -> Self {
        let objects: Objects = Arc::default();
        let puts: Arc<Mutex<usize>> = Arc::default();
        let (stored, counted) = (objects.clone(), puts.clone());

        let app = Router::new()
            .fallback(move |method: Method, uri: Uri, body: Bytes| {
                let (stored, counted) = (stored.clone(), counted.clone());
                async move {
                    match method.as_str() {
                        "PUT" => {
                            *counted.lock().expect("lock") += 1;
                            stored
                                .lock()
                                .expect("lock")
                                .insert(uri.path().to_string(), body.to_vec());
                            StatusCode::CREATED
                        }
                        "MKCOL" => StatusCode::CREATED,
                        _ => StatusCode::NOT_FOUND,
                    }
                }
            })
            .layer(DefaultBodyLimit::disable());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind dav listener");
        let addr = listener.local_addr().expect("dav address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("dav server");
        });

        Self {
            endpoint: format!("http://{addr}"),
            objects,
            puts,
        }
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Body of the last `PUT` to `path`.
    pub(crate) fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().expect("lock").get(path).cloned()
    }

    /// Number of `PUT` requests received.
    pub(crate) fn put_count(&self) -> usize {
        *self.puts.lock().expect("lock")
    }
}
