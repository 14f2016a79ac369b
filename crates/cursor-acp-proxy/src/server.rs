//! Proxy server lifecycle.

use std::{
    ops::Range,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use tokio::{
    net::TcpListener,
    sync::{Mutex, oneshot},
    task::JoinHandle,
};

use crate::{
    ProxyConfig, ProxyError,
    port::{self, PortScanner, SsPortScanner},
    router::create_router,
};

/// How long `stop` waits for in-flight requests before aborting the server task.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a started server can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    port: u16,
    base_url: String,
}

struct Running {
    endpoint: Endpoint,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Owns the single local HTTP listener for one bridge process.
///
/// `start` and `stop` are mutually exclusive; a `start` racing another
/// `start` waits for it and returns the same base URL. Dropping the
/// server signals the listener to shut down.
pub struct ProxyServer {
    config: ProxyConfig,
    range: Range<u16>,
    scanner: Arc<dyn PortScanner>,
    running: Mutex<Option<Running>>,
    endpoint: RwLock<Option<Endpoint>>,
}

impl ProxyServer {
    /// Create an idle server.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the config fails validation.
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        config.validate()?;
        Ok(Self {
            config,
            range: port::default_range(),
            scanner: Arc::new(SsPortScanner),
            running: Mutex::new(None),
            endpoint: RwLock::new(None),
        })
    }

    /// Replace the listening-port scanner used during discovery.
    #[must_use]
    pub fn with_scanner(mut self, scanner: Arc<dyn PortScanner>) -> Self {
        self.scanner = scanner;
        self
    }

    /// Replace the candidate range used during discovery.
    #[must_use]
    pub fn with_range(mut self, range: Range<u16>) -> Self {
        self.range = range;
        self
    }

    /// Bind and start serving, returning `http://{host}:{port}/v1`.
    ///
    /// Already-running servers return their current base URL. A requested
    /// port that cannot be bound falls back to discovery.
    ///
    /// # Errors
    /// Returns `PortExhausted` if neither the requested port nor any
    /// discovered candidate could be bound.
    pub async fn start(&self) -> Result<String, ProxyError> {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            return Ok(current.endpoint.base_url.clone());
        }

        let listener = self.bind().await?;
        let port = listener.local_addr()?.port();
        let endpoint = Endpoint {
            port,
            base_url: format_base_url(&self.config.host, port),
        };

        let app = create_router(&self.config.health_check_path);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!(error = %e, "Proxy server exited with error");
            }
        });

        tracing::info!(
            host = %self.config.host,
            port,
            base_url = %endpoint.base_url,
            "Proxy started"
        );

        *self.endpoint.write().unwrap_or_else(PoisonError::into_inner) = Some(endpoint.clone());
        let base_url = endpoint.base_url.clone();
        *running = Some(Running {
            endpoint,
            shutdown_tx,
            task,
        });

        Ok(base_url)
    }

    /// Stop serving and close the listener. Safe to call when not started.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        *self.endpoint.write().unwrap_or_else(PoisonError::into_inner) = None;

        let Some(Running {
            endpoint,
            shutdown_tx,
            mut task,
        }) = running.take()
        else {
            return;
        };

        let _ = shutdown_tx.send(());
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task).await.is_err() {
            tracing::warn!(port = endpoint.port, "Proxy did not shut down in time, aborting");
            task.abort();
            let _ = task.await;
        }

        tracing::info!(port = endpoint.port, "Proxy stopped");
    }

    /// The current base URL, or `None` when not started.
    #[must_use]
    pub fn base_url(&self) -> Option<String> {
        self.endpoint
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|e| e.base_url.clone())
    }

    /// The bound port, or `None` when not started.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.endpoint
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|e| e.port)
    }

    async fn bind(&self) -> Result<TcpListener, ProxyError> {
        if let Some(requested) = self.config.requested_port() {
            match self.try_bind(requested).await {
                Ok(listener) => return Ok(listener),
                Err(e) => {
                    tracing::warn!(
                        port = requested,
                        error = %e,
                        "Requested port unavailable, discovering another"
                    );
                }
            }
        }

        self.bind_discovered().await
    }

    async fn bind_discovered(&self) -> Result<TcpListener, ProxyError> {
        let used = self.scanner.listening_ports(self.range.clone()).await;
        let candidates = port::candidate_ports(&used, self.range.clone());

        for candidate in candidates {
            match self.try_bind(candidate).await {
                Ok(listener) => return Ok(listener),
                Err(e) => tracing::debug!(port = candidate, error = %e, "Candidate port taken"),
            }
        }

        Err(ProxyError::PortExhausted {
            start: self.range.start,
            end: self.range.end.saturating_sub(1),
        })
    }

    async fn try_bind(&self, port: u16) -> Result<TcpListener, ProxyError> {
        TcpListener::bind((self.config.host.as_str(), port))
            .await
            .map_err(|source| ProxyError::Bind {
                addr: format!("{}:{port}", self.config.host),
                source,
            })
    }
}

fn format_base_url(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("http://[{host}]:{port}/v1")
    } else {
        format!("http://{host}:{port}/v1")
    }
}
