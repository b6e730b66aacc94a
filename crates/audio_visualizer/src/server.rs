use crate::{routes, state::AppState};
use hyper::{server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use log::{error, info};
use std::{convert::Infallible, net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;

/// Accept connections forever, serving each on its own task.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(
        "listening on http://{addr}, media root {}",
        state.store.root().display()
    );

    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);
        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let state = Arc::clone(&state);
                async move { Ok::<_, Infallible>(routes::handle(state, req).await) }
            });
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                error!("error serving connection from {peer}: {err}");
            }
        });
    }
}
