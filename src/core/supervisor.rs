//! Isolation boundary between the always-running host workload and the
//! on-demand query serving context.
//!
//! The serving context gets its own OS thread and its own Tokio runtime, so a
//! panic, runtime failure or resource exhaustion there cannot stall the host
//! runtime's tasks. A blocking join on the host side observes how the
//! serving thread ended and logs it; nothing is propagated further.

use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::shared::panic::panic_message;

/// Sending half of the shutdown broadcast
pub struct ShutdownTrigger(watch::Sender<bool>);

impl ShutdownTrigger {
    pub fn trigger(&self) {
        let _ = self.0.send(true);
    }
}

/// Receiving half; clone one into every task that must stop on shutdown
#[derive(Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
    /// Resolves once shutdown is triggered or the trigger is dropped
    pub async fn wait(&self) {
        let mut rx = self.0.clone();
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(tx), ShutdownSignal(rx))
}

/// How the serving context ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServingExit {
    Completed,
    Failed(String),
    Panicked(String),
}

pub struct ServingSupervisor {
    handle: JoinHandle<ServingExit>,
}

impl ServingSupervisor {
    /// Run `serve` on a dedicated thread with its own multi-threaded runtime.
    ///
    /// Must be called from within the host runtime.
    pub fn spawn<F, Fut>(worker_threads: usize, serve: F) -> std::io::Result<Self>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        let thread = std::thread::Builder::new()
            .name("serving".to_string())
            .spawn(move || -> anyhow::Result<()> {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(worker_threads.max(1))
                    .thread_name("serving-worker")
                    .enable_all()
                    .build()?;
                runtime.block_on(serve())
            })?;

        let handle = tokio::task::spawn_blocking(move || match thread.join() {
            Ok(Ok(())) => ServingExit::Completed,
            Ok(Err(e)) => ServingExit::Failed(format!("{:#}", e)),
            Err(payload) => ServingExit::Panicked(panic_message(payload.as_ref())),
        });

        tracing::info!(worker_threads, "Serving context started on dedicated thread");
        Ok(Self { handle })
    }

    /// Wait for the serving context to end and log the outcome
    pub async fn wait(self) -> ServingExit {
        let exit = match self.handle.await {
            Ok(exit) => exit,
            Err(e) => ServingExit::Panicked(format!("supervisor join failed: {}", e)),
        };

        match &exit {
            ServingExit::Completed => tracing::info!("Serving context stopped"),
            ServingExit::Failed(reason) => {
                tracing::error!("Serving context failed: {}; host workload continues", reason)
            }
            ServingExit::Panicked(reason) => {
                tracing::error!("Serving context panicked: {}; host workload continues", reason)
            }
        }

        exit
    }
}
