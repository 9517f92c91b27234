use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use canhost_common::{
    messages::CanMessage,
    traits::{CanReceiveController, CanTransmitter, InterruptCause},
    SessionConfig,
};

use crate::sim_sensor::SimSensor;

#[derive(Default)]
struct BusState {
    /// Frames waiting in the host controller's receive slot
    host_rx: VecDeque<CanMessage>,
    /// Every frame put on the bus, in order
    history: Vec<CanMessage>,
    sensor: Option<SimSensor>,
    /// Number of pending flag checks which report busy after each transmit; None is forever
    busy_polls: Option<u32>,
    polls_since_transmit: u32,
    total_polls: u32,
}

/// A simulated CAN bus connecting a host controller to a simulated sensor module
///
/// Frames transmitted by the host are delivered to the attached [`SimSensor`] immediately, and
/// its responses are queued for the host's receive controller.
#[derive(Clone)]
pub struct SimBus {
    config: SessionConfig,
    state: Arc<Mutex<BusState>>,
}

impl SimBus {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(BusState {
                busy_polls: Some(0),
                ..Default::default()
            })),
        }
    }

    pub fn attach_sensor(&mut self, sensor: SimSensor) {
        self.state.lock().unwrap().sensor = Some(sensor);
    }

    /// Access the attached sensor
    pub fn with_sensor<R>(&self, f: impl FnOnce(&mut SimSensor) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(state.sensor.as_mut().expect("No sensor attached"))
    }

    /// Put a frame on the bus from some other node, e.g. a module broadcast
    pub fn inject(&self, msg: CanMessage) {
        let mut state = self.state.lock().unwrap();
        state.history.push(msg);
        state.host_rx.push_back(msg);
    }

    /// Make the transmit pending flag stay set for `polls` checks after each transmit
    ///
    /// None keeps it set forever, as if no node ever acknowledged the frame.
    pub fn set_busy_polls(&self, polls: Option<u32>) {
        self.state.lock().unwrap().busy_polls = polls;
    }

    /// Total number of pending flag checks made by the host
    pub fn total_polls(&self) -> u32 {
        self.state.lock().unwrap().total_polls
    }

    /// Number of frames waiting for the host controller
    pub fn host_rx_pending(&self) -> usize {
        self.state.lock().unwrap().host_rx.len()
    }

    pub fn history(&self) -> Vec<CanMessage> {
        self.state.lock().unwrap().history.clone()
    }

    /// Frames sent by the host to the sensor ID
    pub fn requests(&self) -> Vec<CanMessage> {
        let sensor_id = self.config.can.sensor();
        self.history()
            .into_iter()
            .filter(|m| m.id() == sensor_id)
            .collect()
    }

    pub fn new_transmitter(&self) -> SimTransmitter {
        SimTransmitter { bus: self.clone() }
    }

    pub fn new_controller(&self) -> SimController {
        SimController {
            bus: self.clone(),
            rx_slot: self.config.can.rx_slot,
        }
    }
}

/// The transmit side of the host's simulated controller
pub struct SimTransmitter {
    bus: SimBus,
}

impl CanTransmitter for SimTransmitter {
    fn transmit(&mut self, _slot: u8, msg: &CanMessage) {
        let mut state = self.bus.state.lock().unwrap();
        state.history.push(*msg);
        state.polls_since_transmit = 0;
        if state.busy_polls.is_none() {
            // Nobody acknowledges the frame
            return;
        }
        let sensor_id = self.bus.config.can.sensor();
        if msg.id() != sensor_id {
            return;
        }
        let responses = match state.sensor.as_mut() {
            Some(sensor) => sensor.handle_request(msg),
            None => Vec::new(),
        };
        for resp in responses {
            state.history.push(resp);
            state.host_rx.push_back(resp);
        }
    }

    fn tx_pending(&mut self) -> bool {
        let mut state = self.bus.state.lock().unwrap();
        state.total_polls += 1;
        state.polls_since_transmit += 1;
        match state.busy_polls {
            Some(n) => state.polls_since_transmit <= n,
            None => true,
        }
    }
}

/// The receive side of the host's simulated controller
///
/// Frames are handed out one per interrupt, in the order they arrived.
pub struct SimController {
    bus: SimBus,
    rx_slot: u8,
}

impl CanReceiveController for SimController {
    fn interrupt_cause(&mut self) -> InterruptCause {
        if !self.bus.state.lock().unwrap().host_rx.is_empty() {
            InterruptCause::MessageObject(self.rx_slot)
        } else {
            InterruptCause::None
        }
    }

    fn new_data(&mut self, slot: u8) -> bool {
        slot == self.rx_slot && !self.bus.state.lock().unwrap().host_rx.is_empty()
    }

    fn fetch(&mut self, slot: u8) -> Option<CanMessage> {
        if slot != self.rx_slot {
            return None;
        }
        self.bus.state.lock().unwrap().host_rx.pop_front()
    }
}

/// A controller which raises a status interrupt every time, with a frame waiting in the slot
pub struct StatusOnlyController {
    pub pending: Option<CanMessage>,
}

impl CanReceiveController for StatusOnlyController {
    fn interrupt_cause(&mut self) -> InterruptCause {
        InterruptCause::Status
    }

    fn new_data(&mut self, _slot: u8) -> bool {
        self.pending.is_some()
    }

    fn fetch(&mut self, _slot: u8) -> Option<CanMessage> {
        self.pending.take()
    }
}
