//! Driven run loop and control surface
//!
//! `spawn_run` puts a `SimulationRun` on its own tokio task with a real-time
//! tick interval. Callers steer it through a small command channel and
//! receive `TickOutput` batches over an unbounded channel; sends are fire
//! and forget, a slow or dropped consumer never stalls the loop.

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};

use super::output::TickOutput;
use super::SimulationRun;
use crate::config::RunConfig;
use crate::core::error::{Result, SimError};
use crate::core::types::{AlarmId, DeviceId, RunId};
use crate::schedule::Action;

#[derive(Debug)]
pub enum RunCommand {
    Pause,
    Resume(oneshot::Sender<Result<()>>),
    /// Terminal; the loop exits after processing it
    Stop,
    Inject {
        device_id: DeviceId,
        action: Action,
        resp: oneshot::Sender<Result<()>>,
    },
    Acknowledge {
        alarm_id: AlarmId,
        resp: oneshot::Sender<Result<()>>,
    },
}

/// Control handle for one spawned run. Cheap to clone; dropping every handle
/// stops the run.
#[derive(Debug, Clone)]
pub struct RunHandle {
    id: RunId,
    commands: mpsc::Sender<RunCommand>,
}

impl RunHandle {
    pub fn id(&self) -> RunId {
        self.id
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(RunCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(RunCommand::Resume(tx)).await?;
        rx.await.map_err(|_| exited())?
    }

    /// Stop the run. Terminal and idempotent: stopping a run whose loop has
    /// already exited is a no-op, matching `SimulationRun::stop`.
    pub async fn stop(&self) -> Result<()> {
        let _ = self.send(RunCommand::Stop).await;
        Ok(())
    }

    /// Validate and queue an action for the run's next tick
    pub async fn inject(&self, device_id: DeviceId, action: Action) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(RunCommand::Inject {
            device_id,
            action,
            resp: tx,
        })
        .await?;
        rx.await.map_err(|_| exited())?
    }

    pub async fn acknowledge(&self, alarm_id: AlarmId) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(RunCommand::Acknowledge { alarm_id, resp: tx }).await?;
        rx.await.map_err(|_| exited())?
    }

    async fn send(&self, command: RunCommand) -> Result<()> {
        self.commands.send(command).await.map_err(|_| exited())
    }
}

fn exited() -> SimError {
    SimError::ClockMisuse("run loop has exited")
}

/// Create the run, spawn its loop, and hand back the control handle plus
/// the output stream. The loop exits when stopped, when every handle is
/// dropped, or when the configured duration has been covered.
pub fn spawn_run(
    config: &RunConfig,
) -> Result<(RunHandle, mpsc::UnboundedReceiver<TickOutput>)> {
    let mut run = SimulationRun::new(config)?;
    let id = run.id();
    let tick_interval = Duration::from_millis(config.tuning.tick_interval_ms);
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<RunCommand>(32);
    let (out_tx, out_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first interval tick fires immediately; swallow it so the
        // first measured elapsed matches one interval.
        interval.tick().await;
        let mut last = Instant::now();

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    None | Some(RunCommand::Stop) => {
                        run.stop();
                        break;
                    }
                    Some(RunCommand::Pause) => run.pause(),
                    Some(RunCommand::Resume(resp)) => {
                        let _ = resp.send(run.resume());
                    }
                    Some(RunCommand::Inject { device_id, action, resp }) => {
                        let _ = resp.send(run.apply_external_action(device_id, action));
                    }
                    Some(RunCommand::Acknowledge { alarm_id, resp }) => {
                        let _ = resp.send(run.acknowledge_alarm(alarm_id));
                    }
                },
                _ = interval.tick() => {
                    let elapsed = last.elapsed();
                    last = Instant::now();
                    match run.tick(elapsed) {
                        Ok(Some(output)) => {
                            let _ = out_tx.send(output);
                        }
                        Ok(None) => {} // paused
                        Err(err) => {
                            tracing::error!(run = %id.0, %err, "tick failed, stopping run");
                            run.stop();
                            break;
                        }
                    }
                    if run.is_finished() {
                        run.stop();
                        break;
                    }
                }
            }
        }
    });

    Ok((RunHandle { id, commands: cmd_tx }, out_rx))
}
