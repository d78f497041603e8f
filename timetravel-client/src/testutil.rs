//! Shared mock backend helper for unit tests.
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use std::convert::Infallible;
use std::net::SocketAddr;

/// Spawn a one-shot hyper server on an ephemeral port and return its base
/// URL. The handler runs for every request; state goes in captured `Arc`s.
pub async fn spawn_server<F>(handler: F) -> String
where
    F: Fn(Request<Body>) -> Response<Body> + Clone + Send + Sync + 'static,
{
    let make_svc = make_service_fn(move |_conn| {
        let handler = handler.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let handler = handler.clone();
                async move { Ok::<_, Infallible>(handler(req)) }
            }))
        }
    });
    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let server = Server::bind(&addr).serve(make_svc);
    let base = format!("http://{}", server.local_addr());
    tokio::spawn(server);
    base
}
