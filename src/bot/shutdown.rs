//! Process-wide shutdown signal shared by the update loop and the jukebox.

use std::sync::Arc;

use tokio::sync::watch;

/// Why the process is going down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Ctrl-C or the update stream ended.
    Interrupted,
    /// An administrator asked for a restart.
    Restart,
}

impl ExitReason {
    /// Status for a supervisor: 75 (EX_TEMPFAIL) asks to be relaunched.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Interrupted => 0,
            Self::Restart => 75,
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable one-shot signal. The first trigger wins.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<Option<ExitReason>>>,
    rx: watch::Receiver<Option<ExitReason>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Self { tx: Arc::new(tx), rx }
    }

    pub fn trigger(&self, reason: ExitReason) {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
    }

    pub fn reason(&self) -> Option<ExitReason> {
        *self.rx.borrow()
    }

    /// Resolve once the signal has been triggered.
    pub async fn wait(&self) -> ExitReason {
        let mut rx = self.rx.clone();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            if rx.changed().await.is_err() {
                return ExitReason::Interrupted;
            }
        }
    }
}
