//! Binds one HTTP listener to one axum [`Router`] and runs it as a [`Task`].
//!
//! Grounded in the teacher's `GatewayListener`: bind the socket eagerly at construction time (so a
//! startup failure to bind is observed before the task is ever spawned), then serve it to
//! completion inside [`Task::run`], racing the shared shutdown signal.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use axum::Router;
use session_task::{ShutdownSignal, Task};
use tokio::net::TcpListener;
use tracing::info;

use crate::state::AppState;

pub struct HttpListener {
    name: &'static str,
    addr: SocketAddr,
    listener: TcpListener,
    router: Router<Arc<AppState>>,
    state: Arc<AppState>,
}

impl HttpListener {
    pub async fn bind(name: &'static str, addr: &str, router: Router<Arc<AppState>>, state: Arc<AppState>) -> anyhow::Result<Self> {
        let addr: SocketAddr = addr.parse().with_context(|| format!("invalid socket address `{addr}` for {name}"))?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {name} listener on {addr}"))?;

        info!(%name, %addr, "listener bound");

        Ok(Self { name, addr, listener, router, state })
    }
}

#[async_trait]
impl Task for HttpListener {
    type Output = anyhow::Result<()>;

    const NAME: &'static str = "http-listener";

    async fn run(self, mut shutdown_signal: ShutdownSignal) -> anyhow::Result<()> {
        let app = self.router.with_state(self.state);
        let name = self.name;
        let addr = self.addr;

        info!(%name, %addr, "listener serving");

        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move { shutdown_signal.wait().await })
            .await
            .with_context(|| format!("{name} listener failed"))
    }
}
