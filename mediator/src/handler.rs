use crate::transport::Scope;
use crate::{Codec, Payload};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

/// A boxed future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// A handler with its message type erased. It takes the origin and the raw
// payload, and yields the encoded response when the handler answers requests.
pub(crate) type ErasedHandler =
    Arc<dyn Fn(Scope, String) -> BoxFuture<'static, crate::Result<Option<String>>> + Send + Sync>;

/// Decodes the payload into `M`, runs `call` and encodes its output if `respond` is set.
pub(crate) fn erase<M, Out, C, F>(codec: Arc<C>, respond: bool, call: F) -> ErasedHandler
where
    M: Payload,
    Out: Payload,
    C: Codec,
    F: Fn(Scope, M) -> BoxFuture<'static, Out> + Send + Sync + 'static,
{
    let call = Arc::new(call);

    Arc::new(
        move |origin: Scope, payload: String| -> BoxFuture<'static, crate::Result<Option<String>>> {
            let codec = codec.clone();
            let call = call.clone();

            Box::pin(async move {
                let message: M = codec.decode(&payload)?;
                let out = call(origin, message).await;

                if respond {
                    codec.encode(&out).map(Some)
                } else {
                    Ok(None)
                }
            })
        },
    )
}

/// Adapts a `FnMut` closure into a shareable handler.
///
/// The closure is only locked while the future is created, so several
/// invocations may be awaiting at the same time.
pub(crate) fn from_fn<M, Out, H, F>(
    handler: H,
) -> impl Fn(Scope, M) -> BoxFuture<'static, Out> + Send + Sync + 'static
where
    M: Send + 'static,
    Out: Send + 'static,
    H: FnMut(Scope, M) -> F + Send + 'static,
    F: Future<Output = Out> + Send + 'static,
{
    let handler = Arc::new(AsyncMutex::new(handler));

    move |origin: Scope, message: M| -> BoxFuture<'static, Out> {
        let handler = handler.clone();

        Box::pin(async move {
            let mut guard = handler.lock().await;
            let future = (guard)(origin, message);
            drop(guard);
            future.await
        })
    }
}
