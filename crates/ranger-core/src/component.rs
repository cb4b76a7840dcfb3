//! Component seam shared by every long-lived server singleton.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::Result;

/// A long-lived server component managed by the loader.
///
/// Components are created exactly once during initialization and shut down
/// exactly once, in reverse initialization order. `shutdown` must be safe to
/// call while requests are still draining; implementations observe the
/// cancellation token at their suspension points.
#[async_trait]
pub trait Component: Send + Sync {
    /// Stable tag identifying the component type in the loader registry.
    fn type_tag(&self) -> &'static str;

    /// Release the component's resources.
    async fn shutdown(&self, cancel: &CancellationToken) -> Result<()>;
}
