//! Single-consumer command loop.

use log::{info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::GuidanceEngine;
use crate::GpsFix;
use crate::error::Result;
use crate::recalc::{RecalcTicket, RecalculationCoordinator};
use crate::route::RouteModel;
use crate::session::NavigationState;

/// Input to the engine loop.
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationCommand {
    Fix(GpsFix),
    Pause,
    Resume,
    Cancel,
}

type FetchResult = (RecalcTicket, Result<RouteModel>);

impl GuidanceEngine {
    /// Consume commands until the channel closes or navigation is cancelled.
    ///
    /// Fixes are processed strictly in arrival order. A recalculation runs as
    /// a spawned fetch; its result comes back through an internal channel and
    /// is applied between fixes. Cancelling aborts the fetch and any result
    /// that still arrives is discarded. When the channel simply closes, a
    /// pending attempt is awaited and applied. Must be called within a Tokio
    /// runtime.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<NavigationCommand>) -> NavigationState {
        let (result_tx, mut result_rx) = mpsc::channel::<FetchResult>(1);
        let mut in_flight: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                // Fixes first, so a burst is never reordered around a result
                biased;

                command = commands.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    match command {
                        NavigationCommand::Fix(fix) => {
                            let (_, ticket) = self.handle_fix(fix);
                            if let Some(ticket) = ticket {
                                let fetch = RecalculationCoordinator::fetch(self.provider(), ticket);
                                let tx = result_tx.clone();
                                in_flight = Some(tokio::spawn(async move {
                                    // Receiver gone means the loop ended; nothing to apply.
                                    let _ = tx.send(fetch.await).await;
                                }));
                            }
                        }
                        NavigationCommand::Pause => {
                            if let Err(e) = self.pause() {
                                warn!("[Engine] Pause ignored: {}", e);
                            }
                        }
                        NavigationCommand::Resume => {
                            if let Err(e) = self.resume() {
                                warn!("[Engine] Resume ignored: {}", e);
                            }
                        }
                        NavigationCommand::Cancel => {
                            if let Some(handle) = in_flight.take() {
                                handle.abort();
                            }
                            self.cancel();
                            break;
                        }
                    }
                }

                Some((ticket, result)) = result_rx.recv() => {
                    in_flight = None;
                    self.finish_recalculation(ticket, result);
                }
            }
        }

        // Input ended without a cancel: let a pending attempt land so the
        // session is not left in Recalculating.
        drop(result_tx);
        if in_flight.take().is_some() && self.state() == NavigationState::Recalculating {
            if let Some((ticket, result)) = result_rx.recv().await {
                self.finish_recalculation(ticket, result);
            }
        }
        info!("[Engine] Command loop finished in {:?}", self.state());
        self.state()
    }
}
