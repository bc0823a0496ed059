// Process-wide shutdown signal shared by every generator loop
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::info;

/// Graceful shutdown coordinator
///
/// Broadcasts a single stop request to every loop. The first signal is
/// latched, so a listener created after the broadcast still observes it.
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    requested: Arc<AtomicU8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM or a programmatic stop
    Graceful,
    /// SIGINT
    Interrupt,
}

const NOT_REQUESTED: u8 = 0;

impl ShutdownSignal {
    fn code(self) -> u8 {
        match self {
            ShutdownSignal::Graceful => 1,
            ShutdownSignal::Interrupt => 2,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ShutdownSignal::Graceful),
            2 => Some(ShutdownSignal::Interrupt),
            _ => None,
        }
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            shutdown_tx,
            requested: Arc::new(AtomicU8::new(NOT_REQUESTED)),
        }
    }

    /// Install SIGTERM/SIGINT handlers that forward into [`request_shutdown`].
    ///
    /// [`request_shutdown`]: ShutdownCoordinator::request_shutdown
    #[cfg(unix)]
    pub fn install_handlers(&self) -> Result<(), std::io::Error> {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        let coordinator = self.clone();
        tokio::spawn(async move {
            if sigterm.recv().await.is_some() {
                info!("Received SIGTERM, initiating graceful shutdown");
                coordinator.request_shutdown(ShutdownSignal::Graceful);
            }
        });

        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
        let coordinator = self.clone();
        tokio::spawn(async move {
            if sigint.recv().await.is_some() {
                info!("Received SIGINT, initiating shutdown");
                coordinator.request_shutdown(ShutdownSignal::Interrupt);
            }
        });

        Ok(())
    }

    #[cfg(not(unix))]
    pub fn install_handlers(&self) -> Result<(), std::io::Error> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl-C, initiating shutdown");
                coordinator.request_shutdown(ShutdownSignal::Interrupt);
            }
        });
        Ok(())
    }

    pub fn listener(&self) -> ShutdownListener {
        // Subscribe before reading the flag so a concurrent request is never missed.
        let rx = self.shutdown_tx.subscribe();
        ShutdownListener {
            rx,
            requested: self.requested.clone(),
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.signal().is_some()
    }

    /// The signal that started shutdown, if any.
    pub fn signal(&self) -> Option<ShutdownSignal> {
        ShutdownSignal::from_code(self.requested.load(Ordering::SeqCst))
    }

    /// Request shutdown. Only the first call broadcasts; returns whether this
    /// call was the one that did.
    pub fn request_shutdown(&self, signal: ShutdownSignal) -> bool {
        if self
            .requested
            .compare_exchange(NOT_REQUESTED, signal.code(), Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        let _ = self.shutdown_tx.send(signal);
        true
    }

    pub async fn wait_for_shutdown(&self) -> ShutdownSignal {
        self.listener().recv().await
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// One loop's view of the shutdown signal.
#[derive(Debug)]
pub struct ShutdownListener {
    rx: broadcast::Receiver<ShutdownSignal>,
    requested: Arc<AtomicU8>,
}

impl ShutdownListener {
    pub fn is_triggered(&self) -> bool {
        self.signal().is_some()
    }

    fn signal(&self) -> Option<ShutdownSignal> {
        ShutdownSignal::from_code(self.requested.load(Ordering::SeqCst))
    }

    /// Resolves with the requesting signal once shutdown has been requested.
    /// Safe to await repeatedly; after the first resolution every later call
    /// returns immediately.
    pub async fn recv(&mut self) -> ShutdownSignal {
        if let Some(signal) = self.signal() {
            return signal;
        }
        match self.rx.recv().await {
            Ok(signal) => signal,
            // Lagged or closed both mean the coordinator has moved on.
            Err(_) => self.signal().unwrap_or(ShutdownSignal::Graceful),
        }
    }
}
