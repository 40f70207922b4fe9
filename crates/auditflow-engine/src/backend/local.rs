//! In-process backend with linear retry

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;

use super::{Dispatch, ExecutionBackend, Invocation};
use crate::config::RetryConfig;
use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::events::RunEvent;
use crate::registry::Registry;

/// Runs registered node runtimes in the current process
///
/// A manifest with `retry: n` gets up to `n + 1` attempts. After failed
/// attempt `k` the backend waits `k * base_delay` before trying again.
/// Validation failures and cancellation are never retried.
pub struct LocalBackend {
    registry: Arc<Registry>,
    base_delay: Duration,
}

impl LocalBackend {
    pub fn new(registry: Arc<Registry>, retry: &RetryConfig) -> Self {
        install_panic_hook();
        Self {
            registry,
            base_delay: retry.base_delay(),
        }
    }
}

#[async_trait]
impl ExecutionBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn dispatch(&self, invocation: Invocation<'_>, ctx: &ExecutionContext) -> Dispatch {
        let node_type = invocation.manifest.node_type.as_str();
        let Some(runtime) = self.registry.runtime(node_type) else {
            return Dispatch {
                result: Err(NodeError::RuntimeNotFound(node_type.to_string())),
                attempts: 0,
            };
        };

        let max_attempts = invocation.manifest.retry.saturating_add(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let run = runtime.execute(invocation.inputs, invocation.config, ctx);
            let result = match AssertUnwindSafe(run).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(NodeError::Panicked {
                    message: panic_message(payload.as_ref()),
                    details: take_panic_details(),
                }),
            };

            let err = match result {
                Ok(outputs) => {
                    return Dispatch {
                        result: Ok(outputs),
                        attempts: attempt,
                    }
                }
                Err(err) => err,
            };

            if attempt >= max_attempts || !err.is_retryable() {
                return Dispatch {
                    result: Err(err),
                    attempts: attempt,
                };
            }

            let delay = self.base_delay * attempt;
            log::warn!(
                "Node '{}' attempt {}/{} failed: {}; retrying in {:?}",
                invocation.node_id,
                attempt,
                max_attempts,
                err,
                delay
            );
            ctx.emit(RunEvent::NodeRetrying {
                execution_id: ctx.execution_id().to_string(),
                node_id: invocation.node_id.to_string(),
                attempt,
                delay_ms: delay.as_millis() as u64,
                error: err.to_string(),
            });

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = ctx.cancelled() => {
                    return Dispatch {
                        result: Err(NodeError::Cancelled),
                        attempts: attempt,
                    };
                }
            }
        }
    }
}

thread_local! {
    static PANIC_DETAILS: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chain a hook that records where a panic happened
///
/// The record lands in a thread-local slot. A node body panics on the
/// thread that polls it, which is also where `catch_unwind` returns, so the
/// backend can pick the record up right after catching.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_else(|| "unknown location".to_string());
            let backtrace = Backtrace::capture();
            let details = match backtrace.status() {
                BacktraceStatus::Captured => format!("panicked at {}\n{}", location, backtrace),
                _ => format!("panicked at {}", location),
            };
            PANIC_DETAILS.with(|slot| *slot.borrow_mut() = Some(details));
            previous(info);
        }));
    });
}

fn take_panic_details() -> Option<String> {
    PANIC_DETAILS.with(|slot| slot.borrow_mut().take())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
