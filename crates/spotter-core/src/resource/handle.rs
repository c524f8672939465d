use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::FetchError;

use super::cache::{Payload, ResourceCache};
use super::descriptor::ResourceDescriptor;

pub type SuccessCallback = Box<dyn Fn(&Payload) + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(&FetchError) + Send + Sync>;

/// What a view needs to render a resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadState {
    pub loading: bool,
    /// Set once any access settles, successfully or not.
    pub loaded: bool,
    pub error: Option<FetchError>,
    /// Last value delivered to this caller. Kept across failed reloads.
    pub data: Option<Payload>,
}

/// A caller's view of one resource.
///
/// Owns a cancellation token for everything it starts. Dropping the handle
/// cancels it, so an abandoned fetch stops retrying and releases its
/// in-flight marker.
pub struct ResourceHandle {
    cache: Arc<ResourceCache>,
    descriptor: Arc<ResourceDescriptor>,
    cancel: CancellationToken,
    state: LoadState,
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
}

impl ResourceHandle {
    pub(crate) fn new(cache: Arc<ResourceCache>, descriptor: Arc<ResourceDescriptor>) -> Self {
        Self {
            cache,
            descriptor,
            cancel: CancellationToken::new(),
            state: LoadState::default(),
            on_success: None,
            on_error: None,
        }
    }

    /// Tie this handle to a parent scope: cancelling `parent` cancels it too.
    pub fn within(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    pub fn on_success(mut self, callback: impl Fn(&Payload) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&FetchError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    pub fn key(&self) -> &str {
        self.descriptor.key()
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn data(&self) -> Option<&Payload> {
        self.state.data.as_ref()
    }

    /// Deserialize the last delivered value into a typed model.
    pub fn data_as<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.state
            .data
            .as_ref()
            .map(|value| T::deserialize(value.as_ref()))
    }

    /// Token that cancels this handle's work. Cancellation is permanent.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn load(&mut self) -> Result<Payload, FetchError> {
        self.state.loading = true;
        let result = self.cache.access(&self.descriptor, &self.cancel).await;
        self.state.loading = false;

        match &result {
            Ok(value) => {
                self.state.loaded = true;
                self.state.error = None;
                self.state.data = Some(Arc::clone(value));
                if let Some(callback) = &self.on_success {
                    callback(value);
                }
            }
            Err(FetchError::Aborted) => {
                debug!(key = %self.key(), "Load aborted");
            }
            Err(e) => {
                self.state.loaded = true;
                self.state.error = Some(e.clone());
                if let Some(callback) = &self.on_error {
                    callback(e);
                }
            }
        }
        result
    }

    /// Re-run the access path. With `force`, the cached entry is dropped
    /// first so the transport is always called.
    pub async fn reload(&mut self, force: bool) -> Result<Payload, FetchError> {
        if force {
            info!(key = %self.key(), "Forced reload");
            self.cache.invalidate(self.descriptor.key());
        }
        self.load().await
    }
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("key", &self.key())
            .field("state", &self.state)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
