//! Panic containment for validator tasks
//!
//! A panic inside [`contain`] is turned into a [`Crash`] carrying the panic
//! message and the backtrace captured at the panic site. The process-wide
//! panic hook is chained, not replaced: panics outside [`contain`] still
//! reach the previous hook.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;
use std::task::Poll;

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
    static LAST_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static INSTALL_HOOK: Once = Once::new();

/// A panic caught while polling a contained future
#[derive(Debug, Clone)]
pub struct Crash {
    pub message: String,
    pub backtrace: Option<String>,
}

/// Polls `future` to completion, converting a panic into a [`Crash`]
pub async fn contain<F: Future>(future: F) -> Result<F::Output, Crash> {
    install_hook();
    let mut future = std::pin::pin!(future);

    std::future::poll_fn(move |cx| {
        let _capture = CaptureGuard::enter();
        match panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(cx))) {
            Ok(Poll::Ready(output)) => Poll::Ready(Ok(output)),
            Ok(Poll::Pending) => Poll::Pending,
            Err(payload) => Poll::Ready(Err(Crash {
                message: panic_message(payload.as_ref()),
                backtrace: LAST_BACKTRACE.take(),
            })),
        }
    })
    .await
}

fn install_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CAPTURING.get() {
                // the runner logs the crash; keep the default report off stderr
                LAST_BACKTRACE.set(Some(Backtrace::force_capture().to_string()));
            } else {
                previous(info);
            }
        }));
    });
}

/// Marks the current thread as polling a contained future
struct CaptureGuard {
    was_capturing: bool,
}

impl CaptureGuard {
    fn enter() -> Self {
        Self {
            was_capturing: CAPTURING.replace(true),
        }
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        CAPTURING.set(self.was_capturing);
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
