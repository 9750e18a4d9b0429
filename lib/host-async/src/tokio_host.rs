use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, trace};

use crate::bridge::{CompletionSender, FetchRequest, HostBridge};
use crate::op::OpId;

/// Payload of every timer that ran to completion.
pub const TIMER_COMPLETED: &str = "Timer completed";

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("no tokio runtime is running on this thread")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
    #[error("invalid HTTP method {0:?}")]
    InvalidMethod(String),
    #[error("fetch support is not compiled in")]
    FetchUnavailable,
    #[cfg(feature = "fetch")]
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// [`HostBridge`] that runs host work as tasks on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioHost {
    handle: Handle,
    #[cfg(feature = "fetch")]
    client: reqwest::Client,
}

impl TokioHost {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            #[cfg(feature = "fetch")]
            client: reqwest::Client::new(),
        }
    }

    /// Uses the runtime the caller is running in.
    pub fn current() -> Result<Self, BridgeError> {
        Ok(Self::new(Handle::try_current()?))
    }

    #[cfg(feature = "fetch")]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

impl HostBridge for TokioHost {
    fn fetch(&self, id: OpId, request: FetchRequest, done: CompletionSender) {
        debug!(%id, url = %request.url, method = %request.method, "starting fetch");

        #[cfg(feature = "fetch")]
        {
            let client = self.client.clone();
            self.handle.spawn(async move {
                match perform_fetch(&client, request).await {
                    Ok(text) => done.resolve(id, text),
                    Err(err) => {
                        debug!(%id, error = %err, "fetch failed");
                        done.reject(id, err.to_string());
                    }
                }
            });
        }

        #[cfg(not(feature = "fetch"))]
        {
            drop(request);
            done.reject(id, BridgeError::FetchUnavailable.to_string());
        }
    }

    fn timer(&self, id: OpId, delay: Duration, done: CompletionSender) {
        trace!(%id, ?delay, "starting timer");
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            done.resolve(id, TIMER_COMPLETED);
        });
    }
}

#[cfg(feature = "fetch")]
async fn perform_fetch(
    client: &reqwest::Client,
    request: FetchRequest,
) -> Result<String, BridgeError> {
    let method = if request.method.is_empty() {
        reqwest::Method::GET
    } else {
        reqwest::Method::try_from(request.method.as_str())
            .map_err(|_| BridgeError::InvalidMethod(request.method.clone()))?
    };

    let mut builder = client.request(method, &request.url);
    for (name, value) in request.headers() {
        builder = builder.header(name, value);
    }
    if let Some(body) = request.body.filter(|b| !b.is_empty()) {
        builder = builder.body(reqwest::Body::from(body));
    }

    let response = builder.send().await?;
    Ok(response.text().await?)
}
