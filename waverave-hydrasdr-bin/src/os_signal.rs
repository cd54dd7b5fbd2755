use tokio_util::sync::CancellationToken;
use tracing::warn;

static CANCEL: tokio::sync::OnceCell<CancellationToken> = tokio::sync::OnceCell::const_new();

pub struct Quit(CancellationToken);

impl Quit {
    /// Returns when the program has been asked to quit, by the OS or by
    /// [`cancel`][Self::cancel].
    pub async fn quit(&self) {
        self.0.cancelled().await
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub async fn run_until_cancelled<F>(&self, fut: F) -> Option<F::Output>
    where
        F: Future,
    {
        self.0.run_until_cancelled(fut).await
    }
}

pub async fn quit_watch() -> Quit {
    let cancel = CANCEL
        .get_or_init(|| async move {
            let cancel = CancellationToken::new();
            #[cfg(unix)]
            {
                use tokio::signal::unix::{SignalKind, signal};

                for kind in [
                    SignalKind::interrupt(),
                    SignalKind::hangup(),
                    SignalKind::terminate(),
                    SignalKind::pipe(),
                    SignalKind::quit(),
                ] {
                    let cancel_tx = cancel.clone();
                    tokio::spawn(async move {
                        match signal(kind) {
                            Ok(mut sig) => {
                                sig.recv().await;
                                cancel_tx.cancel();
                            }
                            Err(e) => warn!("Couldn't watch for signal {:?}: {}", kind, e),
                        }
                    });
                }
            }
            #[cfg(not(unix))]
            {
                let cancel_tx = cancel.clone();
                tokio::spawn(async move {
                    match tokio::signal::ctrl_c().await {
                        Ok(()) => cancel_tx.cancel(),
                        Err(e) => warn!("Couldn't watch for ctrl-c: {}", e),
                    }
                });
            }
            cancel
        })
        .await;

    Quit(cancel.clone())
}
