//! # Pulse Service
//!
//! Runs a [`PulseDriver`] inside a single tokio task.
//!
//! Caller requests and interrupt events share one channel, so the driver is
//! only ever touched from that task and the handlers never interleave with a
//! frame hand-off. The session token never leaves the task.
//!
//! ## Usage
//!
//! ```no_run
//! use extmodule_pulses::hal::sim::{SimModulePower, SimPulseTimer};
//! use extmodule_pulses::pulses::driver::PulseDriver;
//! use extmodule_pulses::pulses::protocol::Protocol;
//! use extmodule_pulses::service::{IrqEvent, PulseService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let driver = PulseDriver::new(SimPulseTimer::new(), SimModulePower::new());
//!     let (handle, task) = PulseService::spawn(driver, 16);
//!     let irq = handle.irq_line();
//!
//!     handle.start(Protocol::Pxx1).await?;
//!     handle.send_next_frame(&[18, 30, 18, 30], Protocol::Pxx1).await?;
//!     irq.raise(IrqEvent::DmaTransferComplete).await?;
//!     irq.raise(IrqEvent::TimerUpdate).await?;
//!     handle.stop().await?;
//!
//!     drop((handle, irq));
//!     task.await?;
//!     Ok(())
//! }
//! ```

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{ExtModuleError, Result};
use crate::hal::{ModulePower, PulseTimer};
use crate::pulses::driver::{DriverState, DriverStats, ModuleSession, PulseDriver};
use crate::pulses::protocol::Protocol;

/// Hardware interrupt delivered to the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqEvent {
    DmaTransferComplete,
    TimerUpdate,
}

enum Command {
    Start {
        protocol: Protocol,
        reply: oneshot::Sender<Result<()>>,
    },
    SendFrame {
        pulses: Vec<u16>,
        protocol: Protocol,
        reply: oneshot::Sender<Result<bool>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<(DriverState, DriverStats)>,
    },
    Irq(IrqEvent),
}

/// Spawns the driver task
pub struct PulseService;

impl PulseService {
    /// Move `driver` into a new task
    ///
    /// The task ends once every [`PulseHandle`] and [`IrqLine`] is dropped;
    /// it then shuts the module down and hands the driver back through the
    /// returned `JoinHandle`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<T, P>(
        driver: PulseDriver<T, P>,
        queue_depth: usize,
    ) -> (PulseHandle, JoinHandle<PulseDriver<T, P>>)
    where
        T: PulseTimer + 'static,
        P: ModulePower + 'static,
    {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let task = tokio::spawn(run(driver, rx));
        (PulseHandle { tx }, task)
    }
}

async fn run<T, P>(mut driver: PulseDriver<T, P>, mut rx: mpsc::Receiver<Command>) -> PulseDriver<T, P>
where
    T: PulseTimer,
    P: ModulePower,
{
    let mut session: Option<ModuleSession> = None;

    while let Some(command) = rx.recv().await {
        match command {
            Command::Start { protocol, reply } => {
                let result = driver.start(protocol).map(|s| {
                    session = Some(s);
                });
                let _ = reply.send(result);
            }
            Command::SendFrame {
                pulses,
                protocol,
                reply,
            } => {
                let result = match &session {
                    Some(s) => driver.send_next_frame(s, &pulses, protocol),
                    None => Err(ExtModuleError::IllegalState {
                        operation: "send_next_frame",
                        state: driver.state(),
                    }),
                };
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                match session.take() {
                    Some(s) => driver.stop(s),
                    None => driver.shutdown(),
                }
                let _ = reply.send(());
            }
            Command::Status { reply } => {
                let _ = reply.send((driver.state(), driver.stats()));
            }
            Command::Irq(IrqEvent::DmaTransferComplete) => driver.on_dma_transfer_complete(),
            Command::Irq(IrqEvent::TimerUpdate) => driver.on_timer_update(),
        }
    }

    debug!("All pulse handles dropped");
    if let Some(s) = session.take() {
        driver.stop(s);
    }
    info!("Pulse service exited");
    driver
}

/// Caller side of the service
#[derive(Debug, Clone)]
pub struct PulseHandle {
    tx: mpsc::Sender<Command>,
}

impl PulseHandle {
    async fn request<R>(&self, command: impl FnOnce(oneshot::Sender<R>) -> Command) -> Result<R> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| ExtModuleError::ServiceClosed)?;
        response.await.map_err(|_| ExtModuleError::ServiceClosed)
    }

    /// Power the module and configure the timer for `protocol`
    pub async fn start(&self, protocol: Protocol) -> Result<()> {
        self.request(|reply| Command::Start { protocol, reply }).await?
    }

    /// Queue the next frame; `Ok(false)` if the previous one is still in flight
    ///
    /// `pulses` is copied, the caller keeps ownership of its buffer.
    pub async fn send_next_frame(&self, pulses: &[u16], protocol: Protocol) -> Result<bool> {
        let pulses = pulses.to_vec();
        self.request(|reply| Command::SendFrame {
            pulses,
            protocol,
            reply,
        })
        .await?
    }

    /// Power the module off and release the timer
    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Current driver state and counters
    pub async fn status(&self) -> Result<(DriverState, DriverStats)> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Sender for interrupt events
    pub fn irq_line(&self) -> IrqLine {
        IrqLine {
            tx: self.tx.clone(),
        }
    }
}

/// Interrupt side of the service
#[derive(Debug, Clone)]
pub struct IrqLine {
    tx: mpsc::Sender<Command>,
}

impl IrqLine {
    /// Deliver an interrupt, waiting for queue space
    pub async fn raise(&self, event: IrqEvent) -> Result<()> {
        self.tx
            .send(Command::Irq(event))
            .await
            .map_err(|_| ExtModuleError::ServiceClosed)
    }

    /// Deliver an interrupt without waiting
    ///
    /// # Errors
    ///
    /// - [`ExtModuleError::IrqQueueFull`] if the queue has no room; the event
    ///   is dropped and the caller decides whether to raise it again
    /// - [`ExtModuleError::ServiceClosed`] if the service task has exited
    pub fn try_raise(&self, event: IrqEvent) -> Result<()> {
        self.tx.try_send(Command::Irq(event)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ExtModuleError::IrqQueueFull(event),
            mpsc::error::TrySendError::Closed(_) => ExtModuleError::ServiceClosed,
        })
    }
}
