//! Starts a record store server on an ephemeral port.

use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use record_store_api::{ClientConfig, RestStore, Router, Server, ServerConfig};
use scenario_core::{MemoryStore, RecordStore};
use tokio::net::TcpListener;

pub struct TestServer {
    pub store: Arc<MemoryStore>,
    pub base_url: String,
}

impl TestServer {
    /// Serves `store` from a background runtime and returns once it is bound.
    pub fn start(store: MemoryStore, config: ServerConfig) -> Self {
        let store = Arc::new(store);
        let served: Arc<dyn RecordStore> = store.clone();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                let addr = listener.local_addr().unwrap();
                tx.send(addr).unwrap();
                let router = Router::new(served, config).unwrap();
                let _ = Server::new(addr, router).serve_on(listener).await;
            });
        });

        let addr = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        Self {
            store,
            base_url: format!("http://{}", addr),
        }
    }

    pub fn client(&self) -> RestStore {
        self.client_with_token(None)
    }

    pub fn client_with_token(&self, token: Option<&str>) -> RestStore {
        let mut config = ClientConfig::new(&self.base_url);
        config.token = token.map(str::to_string);
        config.timeout = Duration::from_secs(5);
        RestStore::new(config).unwrap()
    }
}
