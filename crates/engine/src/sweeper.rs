//! Background reclamation of abandoned reservations.

use std::time::Duration;

use store::{CartStore, CheckoutStore, FastStore};
use tokio::task::JoinHandle;

use crate::checkout::CheckoutEngine;
use crate::clients::{InventoryClient, ProductCatalog};
use crate::error::Result;
use crate::events::EventSink;

/// Periodically expires checkouts whose reservation window has elapsed.
///
/// Expiry-on-read already covers checkouts that users come back to; the
/// sweeper picks up the ones nobody reads again.
pub struct ExpirySweeper<F, C, K, I, P, E>
where
    F: FastStore + Clone + 'static,
    C: CartStore + Clone + 'static,
    K: CheckoutStore + Clone + 'static,
    I: InventoryClient + Clone + 'static,
    P: ProductCatalog + Clone + 'static,
    E: EventSink + Clone + 'static,
{
    engine: CheckoutEngine<F, C, K, I, P, E>,
    batch_size: u32,
}

impl<F, C, K, I, P, E> ExpirySweeper<F, C, K, I, P, E>
where
    F: FastStore + Clone + 'static,
    C: CartStore + Clone + 'static,
    K: CheckoutStore + Clone + 'static,
    I: InventoryClient + Clone + 'static,
    P: ProductCatalog + Clone + 'static,
    E: EventSink + Clone + 'static,
{
    /// Creates a sweeper that expires at most `batch_size` checkouts
    /// per pass.
    pub fn new(engine: CheckoutEngine<F, C, K, I, P, E>, batch_size: u32) -> Self {
        Self { engine, batch_size }
    }

    /// Runs a single sweep pass. Returns how many checkouts expired.
    pub async fn run_once(&self) -> Result<usize> {
        let expired = self.engine.expire_due(self.batch_size).await?;
        if expired > 0 {
            tracing::info!(expired, "expiry sweep reclaimed reservations");
        }
        Ok(expired)
    }

    /// Spawns the sweep loop on the current runtime.
    ///
    /// Errors are logged and the loop keeps running; a broken store on
    /// one pass must not stop reclamation forever.
    pub fn spawn(self, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    tracing::error!(error = %e, "expiry sweep failed");
                }
            }
        })
    }
}
