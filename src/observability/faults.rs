//! Capture of faults nothing else handles.
//!
//! Panics are reported through a process panic hook under
//! [`UNCAUGHT_TARGET`]; background tasks that panic or return an error are
//! reported under [`REJECTION_TARGET`]. The logging layer routes each target
//! to its own destination in production.
//!
//! A panic raised while a request is being served is caught by the HTTP
//! pipeline and dispatched like any other failure, so the hook stays silent
//! for it.

use std::any::Any;
use std::fmt::Display;
use std::future::Future;

use tokio::task::JoinHandle;

pub const UNCAUGHT_TARGET: &str = "fault::uncaught";
pub const REJECTION_TARGET: &str = "fault::rejection";

tokio::task_local! {
    static REQUEST_SCOPE: ();
}

/// Run `future` as request handling; panics inside it count as caught.
pub async fn within_request<F: Future>(future: F) -> F::Output {
    REQUEST_SCOPE.scope((), future).await
}

/// Whether the current task is serving a request.
pub fn in_request_scope() -> bool {
    REQUEST_SCOPE.try_with(|_| ()).is_ok()
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Log every uncaught panic before the default hook runs.
pub fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if in_request_scope() {
            return;
        }
        let payload = panic_message(info.payload());
        let location = info
            .location()
            .map(ToString::to_string)
            .unwrap_or_else(|| "unknown".to_string());
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(
            target: UNCAUGHT_TARGET,
            payload = %payload,
            location = %location,
            backtrace = %backtrace,
            "Uncaught fault"
        );
        previous(info);
    }));
}

/// Spawn a background task whose failure is logged instead of lost.
pub fn spawn_supervised<F, E>(task: &'static str, future: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let inner = tokio::spawn(future);
    tokio::spawn(async move {
        match inner.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(target: REJECTION_TARGET, task, error = %e, "Background task failed");
            }
            Err(join_error) if join_error.is_panic() => {
                let message = panic_message(join_error.into_panic().as_ref());
                tracing::error!(target: REJECTION_TARGET, task, panic = %message, "Background task panicked");
            }
            Err(_) => {
                tracing::debug!(task, "Background task cancelled");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        let s: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(s.as_ref()), "boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(owned.as_ref()), "owned boom");
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }

    #[tokio::test]
    async fn test_request_scope_is_task_local() {
        assert!(!in_request_scope());
        assert!(within_request(async { in_request_scope() }).await);
        assert!(!in_request_scope());

        let detached = within_request(async { tokio::spawn(async { in_request_scope() }).await })
            .await
            .unwrap();
        assert!(!detached);
    }

    #[tokio::test]
    async fn test_supervised_task_failures_do_not_propagate() {
        let failed = spawn_supervised("failing", async { Err::<(), _>("nope") });
        assert!(failed.await.is_ok());

        let panicked = spawn_supervised("panicking", async {
            if true {
                panic!("task blew up");
            }
            Ok::<(), String>(())
        });
        assert!(panicked.await.is_ok());
    }
}
