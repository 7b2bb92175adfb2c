//! Control thread serializing routing changes
//!
//! OS route-change callbacks, format-change notifications and UI actions can
//! come from different threads. They are all funnelled through one FIFO
//! channel into a single thread that owns the [`RoutingEngine`], so changes
//! are applied in the order they were posted and never interleave.

use crossbeam::channel::{bounded, Sender};
use crosspoint_core::{
    AudioError, Device, DeviceSource, DeviceTopology, DeviceUid, Result, RoutingEngine,
    RoutingReader,
};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Pending requests before posters block
const REQUEST_QUEUE_CAPACITY: usize = 64;

type Reply<T> = Sender<T>;

enum Request {
    UpdateDevices(Vec<Device>, Option<Reply<Result<()>>>),
    SetChannelCounts {
        inputs: usize,
        outputs: usize,
        reply: Option<Reply<Result<()>>>,
    },
    Select(DeviceUid, Reply<Result<()>>),
    Deselect(Reply<()>),
    SetGain {
        input: usize,
        output: usize,
        value: f32,
        reply: Reply<Result<()>>,
    },
    Topology(Reply<DeviceTopology>),
    Selected(Reply<Option<DeviceUid>>),
    Shutdown,
}

/// Cloneable sender side of the control thread
#[derive(Clone)]
pub struct ControlHandle {
    tx: Sender<Request>,
}

impl ControlHandle {
    fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Request) -> Result<T> {
        let (reply_tx, reply_rx) = bounded(1);
        self.tx
            .send(make(reply_tx))
            .map_err(|_| AudioError::ControlClosed)?;
        reply_rx.recv().map_err(|_| AudioError::ControlClosed)
    }

    fn post(&self, request: Request) -> Result<()> {
        self.tx.send(request).map_err(|_| AudioError::ControlClosed)
    }

    /// Replace the device list and wait for the new routing
    pub fn update_devices(&self, devices: Vec<Device>) -> Result<()> {
        self.request(|reply| Request::UpdateDevices(devices, Some(reply)))?
    }

    /// Queue a device list change without waiting, for OS callbacks
    ///
    /// Failures are logged on the control thread.
    pub fn post_devices(&self, devices: Vec<Device>) -> Result<()> {
        self.post(Request::UpdateDevices(devices, None))
    }

    /// Query `source` and apply its device list
    pub fn refresh_from(&self, source: &dyn DeviceSource) -> Result<()> {
        let devices = source.output_devices()?;
        self.update_devices(devices)
    }

    pub fn set_channel_counts(&self, inputs: usize, outputs: usize) -> Result<()> {
        self.request(|reply| Request::SetChannelCounts {
            inputs,
            outputs,
            reply: Some(reply),
        })?
    }

    /// Queue a channel count change without waiting
    pub fn post_channel_counts(&self, inputs: usize, outputs: usize) -> Result<()> {
        self.post(Request::SetChannelCounts {
            inputs,
            outputs,
            reply: None,
        })
    }

    pub fn select(&self, uid: DeviceUid) -> Result<()> {
        self.request(|reply| Request::Select(uid, reply))?
    }

    pub fn deselect(&self) -> Result<()> {
        self.request(Request::Deselect)
    }

    pub fn set_gain(&self, input: usize, output: usize, value: f32) -> Result<()> {
        self.request(|reply| Request::SetGain {
            input,
            output,
            value,
            reply,
        })?
    }

    /// Copy of the current topology, for display
    pub fn topology(&self) -> Result<DeviceTopology> {
        self.request(Request::Topology)
    }

    pub fn selected(&self) -> Result<Option<DeviceUid>> {
        self.request(Request::Selected)
    }
}

/// Thread owning the routing engine
pub struct ControlThread {
    handle: ControlHandle,
    reader: RoutingReader,
    join: Option<JoinHandle<RoutingEngine>>,
}

impl ControlThread {
    /// Move `engine` onto a dedicated control thread
    pub fn spawn(engine: RoutingEngine) -> Result<Self> {
        let reader = engine.reader();
        let (tx, rx) = bounded::<Request>(REQUEST_QUEUE_CAPACITY);

        let join = thread::Builder::new()
            .name("crosspoint-control".to_string())
            .spawn(move || {
                let mut engine = engine;
                info!("Control thread started");

                for request in rx.iter() {
                    match request {
                        Request::UpdateDevices(devices, reply) => {
                            respond(reply, engine.update_devices(devices), "update devices");
                        }
                        Request::SetChannelCounts {
                            inputs,
                            outputs,
                            reply,
                        } => {
                            respond(
                                reply,
                                engine.set_channel_counts(inputs, outputs),
                                "set channel counts",
                            );
                        }
                        Request::Select(uid, reply) => {
                            let _ = reply.send(engine.select(&uid));
                        }
                        Request::Deselect(reply) => {
                            engine.deselect();
                            let _ = reply.send(());
                        }
                        Request::SetGain {
                            input,
                            output,
                            value,
                            reply,
                        } => {
                            let _ = reply.send(engine.set_gain(input, output, value));
                        }
                        Request::Topology(reply) => {
                            let _ = reply.send(engine.topology().clone());
                        }
                        Request::Selected(reply) => {
                            let _ = reply.send(engine.selected().cloned());
                        }
                        Request::Shutdown => break,
                    }
                }

                info!("Control thread stopped");
                engine
            })
            .map_err(|e| AudioError::OsError(e.to_string()))?;

        Ok(Self {
            handle: ControlHandle { tx },
            reader,
            join: Some(join),
        })
    }

    pub fn handle(&self) -> ControlHandle {
        self.handle.clone()
    }

    /// Read side for the render thread
    pub fn reader(&self) -> RoutingReader {
        self.reader.clone()
    }

    /// Stop the thread after the queued requests and hand the engine back
    pub fn shutdown(mut self) -> Result<RoutingEngine> {
        self.stop()
    }

    fn stop(&mut self) -> Result<RoutingEngine> {
        let join = self.join.take().ok_or(AudioError::ControlClosed)?;
        let _ = self.handle.tx.send(Request::Shutdown);
        join.join().map_err(|_| {
            error!("Control thread panicked");
            AudioError::ControlClosed
        })
    }
}

impl Drop for ControlThread {
    fn drop(&mut self) {
        if self.join.is_some() {
            debug!("Shutting down control thread");
            let _ = self.stop();
        }
    }
}

/// Send a result back, or log it when the poster did not wait
fn respond(reply: Option<Reply<Result<()>>>, result: Result<()>, what: &str) {
    match reply {
        Some(reply) => {
            let _ = reply.send(result);
        }
        None => {
            if let Err(e) = result {
                warn!(error = %e, "Posted request failed: {}", what);
            }
        }
    }
}
