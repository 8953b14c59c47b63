use std::time::Duration;

use tokio::sync::oneshot;

use system::{SessionId, COUNTDOWN_FROM};

use crate::server::{ServerCommand, ServerTx};

/// Handle to a running countdown ticker, stored in the owning session.
/// Cancelling it stops the task before its next tick; the generation lets the
/// server loop discard ticks that raced a cancellation or restart.
pub struct Countdown {
    pub generation: u64,
    cancel_tx: oneshot::Sender<()>,
}

impl Countdown {
    pub fn cancel(self) {
        let _ = self.cancel_tx.send(());
    }
}

/// Spawns the recurring tick task. The caller broadcasts the initial
/// `COUNTDOWN_FROM` tick itself; the task reports each later tick back into
/// the server loop, which validates the generation before acting, so the
/// ticker never mutates session state from outside the loop.
pub fn spawn_countdown(
    mut srv_tx: ServerTx,
    session_id: SessionId,
    generation: u64,
    tick: Duration,
) -> Countdown {
    let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let mut remaining = COUNTDOWN_FROM;
        while remaining > 0 {
            tokio::select! {
                _ = tokio::time::delay_for(tick) => {
                    remaining -= 1;
                    let elapsed = ServerCommand::CountdownElapsed {
                        session_id,
                        generation,
                        remaining,
                    };
                    if srv_tx.send(elapsed).await.is_err() {
                        return;
                    }
                }
                _ = &mut cancel_rx => {
                    log::debug!("countdown for session {} cancelled", session_id);
                    return;
                }
            }
        }
    });

    Countdown {
        generation,
        cancel_tx,
    }
}
