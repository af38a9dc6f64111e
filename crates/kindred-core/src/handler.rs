//! Command handlers and lifecycle hooks.
//!
//! Any async function or closure taking a [`CommandContext`] can be used as
//! a command handler, as long as its output implements
//! [`IntoHandlerResult`]:
//!
//! ```rust,ignore
//! async fn ping(ctx: CommandContext) -> Result<(), BoxError> {
//!     ctx.reply("pong").await
//! }
//!
//! async fn log_only(ctx: CommandContext) {
//!     tracing::info!(sender = %ctx.sender(), "seen");
//! }
//! ```
//!
//! Hooks follow the same shape with a [`HookContext`].

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::context::{CommandContext, HookContext};
use crate::error::BoxError;

/// Result of running a handler or hook.
pub type HandlerResult = Result<(), BoxError>;

/// Conversion from a handler's return value into a [`HandlerResult`].
pub trait IntoHandlerResult {
    /// Performs the conversion.
    fn into_handler_result(self) -> HandlerResult;
}

impl IntoHandlerResult for () {
    fn into_handler_result(self) -> HandlerResult {
        Ok(())
    }
}

impl<E: Into<BoxError>> IntoHandlerResult for Result<(), E> {
    fn into_handler_result(self) -> HandlerResult {
        self.map_err(Into::into)
    }
}

// =============================================================================
// CommandHandler
// =============================================================================

/// The asynchronous function bound to a command name.
pub trait CommandHandler: Send + Sync + 'static {
    /// Runs the handler for one invocation.
    fn call(&self, ctx: CommandContext) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut, R> CommandHandler for F
where
    F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoHandlerResult,
{
    fn call(&self, ctx: CommandContext) -> BoxFuture<'static, HandlerResult> {
        let fut = self(ctx);
        Box::pin(async move { fut.await.into_handler_result() })
    }
}

/// Shared handle to a command handler.
pub type BoxedHandler = Arc<dyn CommandHandler>;

// =============================================================================
// Hooks
// =============================================================================

/// Type-erased lifecycle hook.
pub type HookFn = Arc<dyn Fn(HookContext) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Erases a hook closure into a [`HookFn`].
pub fn into_hook<F, Fut, R>(hook: F) -> HookFn
where
    F: Fn(HookContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoHandlerResult,
{
    Arc::new(move |ctx| {
        let fut = hook(ctx);
        Box::pin(async move { fut.await.into_handler_result() })
    })
}

/// Awaits `fut`, turning a panic into an error so that a misbehaving plugin
/// cannot unwind through the dispatcher or the lifecycle controller.
pub(crate) async fn contain(fut: BoxFuture<'static, HandlerResult>) -> HandlerResult {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(format!("panicked: {}", panic_message(panic.as_ref())).into()),
    }
}

/// Text carried by a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capabilities;
    use crate::context::HookContext;
    use crate::name::Name;

    async fn refuse(_ctx: HookContext) -> Result<(), BoxError> {
        Err("not today".into())
    }

    async fn explode(_ctx: HookContext) {
        panic!("hook blew up");
    }

    fn hook_ctx() -> HookContext {
        HookContext::new(Name::new("demo").unwrap(), None, Capabilities::default())
    }

    #[tokio::test]
    async fn test_hook_error_is_returned() {
        let hook = into_hook(refuse);
        let err = contain(hook(hook_ctx())).await.unwrap_err();
        assert_eq!(err.to_string(), "not today");
    }

    #[tokio::test]
    async fn test_panic_becomes_error() {
        let hook = into_hook(explode);
        let err = contain(hook(hook_ctx())).await.unwrap_err();
        assert_eq!(err.to_string(), "panicked: hook blew up");
    }

    #[test]
    fn test_unit_output_is_ok() {
        assert!(().into_handler_result().is_ok());
        assert!(Err::<(), _>("no").into_handler_result().is_err());
    }
}
