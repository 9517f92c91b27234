use canhost_common::{
    messages::{CanId, CanMessage},
    protocol::{Broadcast, Request, Response},
    CommandCode, SessionConfig,
};

/// A simulated sensor module
///
/// Answers requests the way the module firmware does, including streaming its recorded samples
/// in response to `FlashGetData`.
pub struct SimSensor {
    extended: bool,
    pub module_id: u16,
    pub version: u32,
    pub raw_data: u32,
    pub samples: Vec<u32>,
    pub sample_size: u32,
    pub recording: bool,
    /// When false, requests are received but never answered
    pub responsive: bool,
    /// Every request received
    pub received: Vec<Request>,
}

impl SimSensor {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            extended: config.can.extended,
            module_id: config.can.sensor_id,
            version: 1000,
            raw_data: 0x1234,
            samples: Vec::new(),
            sample_size: 0x10000,
            recording: false,
            responsive: true,
            received: Vec::new(),
        }
    }

    fn frame(&self, id: u16, payload: [u8; 8]) -> CanMessage {
        let id = if self.extended {
            CanId::extended(id as u32)
        } else {
            CanId::std(id)
        };
        CanMessage::new(id, &payload)
    }

    /// The broadcast frame the module sends to announce itself
    pub fn broadcast(&self, broadcast_id: u16, value: u32) -> CanMessage {
        let b = Broadcast {
            module_id: self.module_id,
            value,
        };
        self.frame(broadcast_id, b.to_bytes())
    }

    /// Handle a request frame, returning the response frames in the order they are sent
    pub fn handle_request(&mut self, msg: &CanMessage) -> Vec<CanMessage> {
        let Some(req) = Request::from_bytes(&msg.padded_data()) else {
            return Vec::new();
        };
        self.received.push(req);
        if !self.responsive {
            return Vec::new();
        }

        let position = self.samples.len() as u32 * 4;
        let values = match req.command {
            CommandCode::ReadVersion => vec![self.version],
            CommandCode::ReadData => vec![self.raw_data],
            CommandCode::FlashStart => {
                self.recording = true;
                vec![position]
            }
            CommandCode::FlashReadPos => vec![position],
            CommandCode::FlashEraseFull => {
                self.samples.clear();
                vec![0]
            }
            CommandCode::FlashSetSampleSize => {
                self.sample_size = req.argument.unwrap_or(0);
                vec![self.sample_size]
            }
            CommandCode::FlashStatus => vec![u32::from(self.recording)],
            CommandCode::FlashGetData => {
                let mut values = vec![position];
                values.extend_from_slice(&self.samples);
                values.push(0);
                values
            }
            CommandCode::FlashGenCsv => vec![0],
        };

        values
            .into_iter()
            .map(|value| {
                let resp = Response {
                    echo: req.command.raw(),
                    value,
                };
                self.frame(req.host_id, resp.to_bytes())
            })
            .collect()
    }
}
