use axum::Router;

/// Serve `app` on an ephemeral local port and return its base URL.
///
/// The server task lives until the test runtime shuts down.
pub async fn spawn_backend(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake backend");
    });
    format!("http://{addr}")
}
