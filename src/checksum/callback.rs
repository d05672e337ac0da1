//! Change notification callbacks.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::{CacheError, Result};

type SyncFn = dyn Fn(&Path) -> anyhow::Result<()> + Send + Sync;
type AsyncFn = dyn Fn(PathBuf) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// Callback fired when a tracked file is confirmed changed.
///
/// Receives the changed path only; tracker state is never exposed.
#[derive(Clone)]
pub enum ChangeCallback {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
}

impl ChangeCallback {
    /// Wraps a blocking closure.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&Path) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    /// Wraps a closure returning a future.
    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(PathBuf) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::Async(Arc::new(move |path| f(path).boxed()))
    }

    /// Runs the callback, turning both errors and panics into `CacheError::Callback`.
    pub async fn invoke(&self, path: &Path) -> Result<()> {
        let outcome = match self {
            ChangeCallback::Sync(f) => catch_unwind(AssertUnwindSafe(|| f(path))),
            ChangeCallback::Async(f) => {
                AssertUnwindSafe(f(path.to_path_buf()))
                    .catch_unwind()
                    .await
            }
        };

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(CacheError::Callback {
                path: path.to_path_buf(),
                message: format!("{:#}", err),
            }),
            Err(panic) => Err(CacheError::Callback {
                path: path.to_path_buf(),
                message: format!("panicked: {}", panic_message(panic.as_ref())),
            }),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic payload")
}

impl fmt::Debug for ChangeCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeCallback::Sync(_) => f.write_str("ChangeCallback::Sync"),
            ChangeCallback::Async(_) => f.write_str("ChangeCallback::Async"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_sync_callback_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cb = ChangeCallback::sync(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        cb.invoke(Path::new("a")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_async_callback_receives_path() {
        let cb = ChangeCallback::future(|path| async move {
            anyhow::ensure!(path == Path::new("Cargo.toml"), "wrong path {}", path.display());
            Ok(())
        });

        assert!(cb.invoke(Path::new("Cargo.toml")).await.is_ok());
        assert!(cb.invoke(Path::new("other")).await.is_err());
    }

    #[tokio::test]
    async fn test_error_is_wrapped() {
        let cb = ChangeCallback::sync(|_| Err(anyhow::anyhow!("boom")));

        let err = cb.invoke(Path::new("x")).await.unwrap_err();
        assert!(matches!(err, CacheError::Callback { ref message, .. } if message.contains("boom")));
    }

    #[tokio::test]
    async fn test_panics_are_caught() {
        let sync_cb = ChangeCallback::sync(|_| panic!("sync kaboom"));
        let async_cb = ChangeCallback::future(|_| async {
            if true {
                panic!("async kaboom");
            }
            anyhow::Ok(())
        });

        let sync_err = sync_cb.invoke(Path::new("x")).await.unwrap_err();
        let async_err = async_cb.invoke(Path::new("x")).await.unwrap_err();

        assert!(sync_err.to_string().contains("sync kaboom"));
        assert!(async_err.to_string().contains("async kaboom"));
    }
}
