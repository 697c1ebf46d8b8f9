//! A dedicated thread that owns a wrapper tree and runs jobs against it.
//!
//! Wrappers are `!Send`: they and the host they talk to stay on the thread
//! that created them. Async callers hand closures to the worker and await
//! the reply over a oneshot channel.

use std::thread::JoinHandle;

use tokio::sync::{mpsc, oneshot};

use crate::errors::{WrapperError, WrapperResult};

/// Threading model of the apartment the worker thread joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApartmentModel {
    /// Single-threaded apartment; what desktop automation servers expect.
    #[default]
    SingleThreaded,
    MultiThreaded,
}

#[derive(Debug, Clone)]
pub struct ApartmentConfig {
    pub model: ApartmentModel,
    /// Bound on queued jobs before `run` applies backpressure.
    pub queue_capacity: usize,
    pub thread_name: String,
}

impl Default for ApartmentConfig {
    fn default() -> Self {
        Self {
            model: ApartmentModel::default(),
            queue_capacity: 32,
            thread_name: "host-apartment".to_string(),
        }
    }
}

type Job<S> = Box<dyn FnOnce(&S) + Send>;

#[cfg(all(windows, feature = "com-backend"))]
fn enter_apartment(model: ApartmentModel) -> anyhow::Result<crate::com_guard::ComGuard> {
    crate::com_guard::ComGuard::new(model)
}

#[cfg(not(all(windows, feature = "com-backend")))]
#[allow(clippy::unnecessary_wraps)]
fn enter_apartment(model: ApartmentModel) -> anyhow::Result<()> {
    tracing::debug!(?model, "no COM runtime, apartment is a plain thread");
    Ok(())
}

/// Owns a session value `S` (typically an [`crate::model::Application`])
/// on its own thread.
///
/// The session is built on the worker thread by the `connect` closure and
/// never leaves it. Dropping the worker closes the queue, lets queued jobs
/// finish, drops the session and joins the thread.
pub struct ApartmentWorker<S: 'static> {
    sender: Option<mpsc::Sender<Job<S>>>,
    handle: Option<JoinHandle<()>>,
}

impl<S: 'static> ApartmentWorker<S> {
    /// Spawns the apartment thread and waits for `connect` to finish.
    ///
    /// Blocks the calling thread; from async code call it inside
    /// `tokio::task::spawn_blocking`.
    ///
    /// # Errors
    ///
    /// Returns the error from `connect`, or [`WrapperError::Internal`] when
    /// the thread cannot be spawned or the apartment cannot be entered.
    pub fn start<F>(config: ApartmentConfig, connect: F) -> WrapperResult<Self>
    where
        F: FnOnce() -> WrapperResult<S> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<Job<S>>(config.queue_capacity.max(1));
        let (init_tx, init_rx) = oneshot::channel();
        let model = config.model;

        let handle = std::thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                let _apartment = match enter_apartment(model) {
                    Ok(guard) => guard,
                    Err(e) => {
                        tracing::error!(error = ?e, "apartment worker failed to initialize");
                        let _ = init_tx.send(Err(WrapperError::Internal(format!(
                            "apartment init failed: {e}"
                        ))));
                        return;
                    }
                };

                let session = match connect() {
                    Ok(session) => {
                        let _ = init_tx.send(Ok(()));
                        session
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "apartment connect failed");
                        let _ = init_tx.send(Err(e));
                        return;
                    }
                };

                while let Some(job) = rx.blocking_recv() {
                    job(&session);
                }

                drop(session);
                tracing::debug!("apartment thread exiting cleanly");
            })
            .map_err(|e| WrapperError::Internal(format!("failed to spawn apartment thread: {e}")))?;

        init_rx.blocking_recv().map_err(|_| {
            WrapperError::Internal("apartment thread panicked during init".into())
        })??;

        tracing::debug!(thread = %config.thread_name, ?model, "apartment worker started");

        Ok(Self {
            sender: Some(tx),
            handle: Some(handle),
        })
    }

    fn check_alive(&self) -> WrapperResult<&mpsc::Sender<Job<S>>> {
        if self
            .handle
            .as_ref()
            .is_some_and(std::thread::JoinHandle::is_finished)
        {
            tracing::error!("apartment thread panicked or exited unexpectedly");
            return Err(WrapperError::Internal("apartment thread stopped".into()));
        }
        self.sender
            .as_ref()
            .ok_or_else(|| WrapperError::Internal("apartment worker shut down".into()))
    }

    fn package<F, R>(job: F) -> (Job<S>, oneshot::Receiver<WrapperResult<R>>)
    where
        F: FnOnce(&S) -> WrapperResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let job: Job<S> = Box::new(move |session| {
            let span = tracing::info_span!("apartment.job");
            let _enter = span.enter();
            let _ = reply.send(job(session));
        });
        (job, rx)
    }

    /// Runs `job` on the apartment thread and awaits its result.
    ///
    /// # Errors
    ///
    /// Returns whatever `job` returns, or [`WrapperError::Internal`] when
    /// the worker is gone or the job panicked.
    pub async fn run<F, R>(&self, job: F) -> WrapperResult<R>
    where
        F: FnOnce(&S) -> WrapperResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let sender = self.check_alive()?;
        let (job, rx) = Self::package(job);

        sender
            .send(job)
            .await
            .map_err(|_| WrapperError::Internal("apartment channel closed (worker stopped)".into()))?;

        rx.await
            .map_err(|_| WrapperError::Internal("apartment job panicked or worker shut down".into()))?
    }

    /// Blocking flavour of [`ApartmentWorker::run`] for synchronous callers.
    ///
    /// Must not be called from inside an async runtime.
    ///
    /// # Errors
    ///
    /// Same as [`ApartmentWorker::run`].
    pub fn run_blocking<F, R>(&self, job: F) -> WrapperResult<R>
    where
        F: FnOnce(&S) -> WrapperResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let sender = self.check_alive()?;
        let (job, rx) = Self::package(job);

        sender
            .blocking_send(job)
            .map_err(|_| WrapperError::Internal("apartment channel closed (worker stopped)".into()))?;

        rx.blocking_recv()
            .map_err(|_| WrapperError::Internal("apartment job panicked or worker shut down".into()))?
    }

    /// Closes the queue and joins the thread once queued jobs have run.
    ///
    /// # Errors
    ///
    /// Returns [`WrapperError::Internal`] if the thread panicked.
    pub fn shutdown(mut self) -> WrapperResult<()> {
        self.stop()
    }

    fn stop(&mut self) -> WrapperResult<()> {
        self.sender.take();
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| WrapperError::Internal("apartment thread panicked".into())),
            None => Ok(()),
        }
    }
}

impl<S: 'static> Drop for ApartmentWorker<S> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "apartment worker stopped abnormally");
        }
    }
}

impl<S: 'static> std::fmt::Debug for ApartmentWorker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApartmentWorker")
            .field("running", &self.sender.is_some())
            .finish()
    }
}
