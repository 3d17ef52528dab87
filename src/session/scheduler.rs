//! The proactive loop: one timer task per connection, polling the idle gate
//! once per second and running an unsolicited turn when it opens.
//!
//! A single sequential loop, so the scheduler can never overlap itself; the
//! claim inside [`Orchestrator::run_proactive_turn`] makes most ticks a
//! cheap no-op. The owning connection aborts this task on disconnect.

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};

use crate::session::orchestrator::Orchestrator;

const TICK: Duration = Duration::from_secs(1);

pub async fn run(orchestrator: Orchestrator) {
    tracing::info!("proactive scheduler started");
    let mut tick = interval(TICK);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tick.tick().await;
        orchestrator.run_proactive_turn().await;
    }
}
