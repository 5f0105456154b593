//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use bytes::Bytes;
#[allow(unused_imports)]
pub use sts_lib::command::Command;
#[allow(unused_imports)]
pub use sts_lib::config::DeviceConfig;
#[allow(unused_imports)]
pub use sts_lib::error::{DeviceErrorCode, StsError};
#[allow(unused_imports)]
pub use sts_lib::frame::{Flags, Frame, ParsedFrame, decode_response, frame_len};
#[allow(unused_imports)]
pub use sts_lib::transport::{Line, UsbTransport};
#[allow(unused_imports)]
pub use sts_lib::{Sts, TemperatureSensor};

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Something the driver did to the bus, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)]
pub enum Event {
    Write(u8),
    Read(u8),
}

/// Register-backed stand-in for an STS on the bus.
///
/// Requests are reassembled from the written blocks, answered from the
/// register state, and the reply blocks are queued on the matching IN
/// endpoint. Raw blocks pushed with [`SimulatedSts::inject`] are read before
/// any queued reply. Clones share the same device.
#[derive(Default, Clone)]
pub struct SimulatedSts {
    state: Arc<Mutex<State>>,
}

#[allow(dead_code)]
pub struct Registers {
    pub serial: String,
    pub alias: String,
    pub user_strings: Vec<String>,
    pub hardware_revision: u8,
    pub firmware_revision: u16,
    pub integration_us: u32,
    pub trigger_mode: u8,
    pub trigger_delay_us: u32,
    pub lamp: bool,
    pub pixel_binning: u8,
    pub default_binning: u8,
    pub scans_to_average: u16,
    pub boxcar: u8,
    pub wavelength_coeffs: Vec<f32>,
    pub nonlinearity_coeffs: Vec<f32>,
    pub stray_light_coeffs: Vec<f32>,
    pub irradiance: Option<Vec<f32>>,
    pub collection_area: Option<f32>,
    pub hot_pixels: Vec<u16>,
    pub spectrum: Vec<u16>,
    pub temperatures: [f32; 3],
    pub bench_id: String,
    pub slit_width: u16,
    pub fiber_diameter: u16,
    pub led_pattern: u8,
    pub reset_count: u32,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            serial: "S05678".to_string(),
            alias: String::new(),
            user_strings: vec![String::new(); 4],
            hardware_revision: 2,
            firmware_revision: 0x0123,
            integration_us: 10_000,
            trigger_mode: 0,
            trigger_delay_us: 0,
            lamp: false,
            pixel_binning: 0,
            default_binning: 0,
            scans_to_average: 1,
            boxcar: 0,
            wavelength_coeffs: vec![337.5, 0.4634, -2.1e-5, -1.3e-9],
            nonlinearity_coeffs: vec![0.93, 1.2e-5, -3.5e-9, 4.1e-13, 0.0, 0.0, 0.0, 0.0],
            stray_light_coeffs: vec![0.0],
            irradiance: None,
            collection_area: None,
            hot_pixels: Vec::new(),
            spectrum: (0..1024).map(|i| i as u16 * 3).collect(),
            temperatures: [24.5, 0.0, 31.25],
            bench_id: "STS-VIS 25um".to_string(),
            slit_width: 25,
            fiber_diameter: 400,
            led_pattern: 0,
            reset_count: 0,
        }
    }
}

#[derive(Default)]
struct State {
    regs: Registers,
    partial: HashMap<u8, Vec<u8>>,
    replies: HashMap<u8, VecDeque<Vec<u8>>>,
    injected: HashMap<u8, VecDeque<Vec<u8>>>,
    requests: Vec<ParsedFrame>,
    events: Vec<Event>,
    fail_writes: bool,
    silent: bool,
}

#[allow(dead_code)]
impl SimulatedSts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues raw 64-byte blocks to be read on `line` before any reply.
    pub fn inject(&self, line: Line, frame: Bytes) {
        let mut state = self.state.lock().unwrap();
        let queue = state.injected.entry(line.endpoint_in()).or_default();
        for block in frame.chunks(64) {
            queue.push_back(block.to_vec());
        }
    }

    /// Makes every write fail with a timeout.
    pub fn fail_writes(&self) {
        self.state.lock().unwrap().fail_writes = true;
    }

    /// Swallows every request without replying.
    pub fn go_silent(&self) {
        self.state.lock().unwrap().silent = true;
    }

    pub fn with_registers<R>(&self, f: impl FnOnce(&mut Registers) -> R) -> R {
        f(&mut self.state.lock().unwrap().regs)
    }

    /// Every complete request frame received so far.
    pub fn requests(&self) -> Vec<ParsedFrame> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn write_count(&self) -> usize {
        self.events().iter().filter(|e| matches!(e, Event::Write(_))).count()
    }

    pub fn read_count(&self) -> usize {
        self.events().iter().filter(|e| matches!(e, Event::Read(_))).count()
    }
}

impl UsbTransport for SimulatedSts {
    async fn write(&self, endpoint: u8, data: Vec<u8>) -> Result<usize, StsError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Write(endpoint));
        if state.fail_writes {
            return Err(StsError::TransportTimeout {
                endpoint,
                timeout: Duration::from_millis(1),
            });
        }

        let len = data.len();
        let buffer = state.partial.entry(endpoint).or_default();
        buffer.extend_from_slice(&data);
        let expected = frame_len(u32::from_le_bytes([buffer[40], buffer[41], buffer[42], buffer[43]]));
        if buffer.len() >= expected {
            let bytes = std::mem::take(buffer);
            let request = decode_response(&bytes).expect("simulator received a malformed frame");
            state.requests.push(request.clone());
            if state.silent {
                return Ok(len);
            }
            if let Some(reply) = state.handle(&request) {
                let queue = state.replies.entry(endpoint | 0x80).or_default();
                for block in reply.chunks(64) {
                    queue.push_back(block.to_vec());
                }
            }
        }
        Ok(len)
    }

    async fn read(&self, endpoint: u8, max_len: usize, timeout: Duration) -> Result<Vec<u8>, StsError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Read(endpoint));
        let injected = state.injected.get_mut(&endpoint).and_then(VecDeque::pop_front);
        let block = injected.or_else(|| state.replies.get_mut(&endpoint).and_then(VecDeque::pop_front));
        match block {
            Some(mut block) => {
                block.truncate(max_len);
                Ok(block)
            }
            None => Err(StsError::TransportTimeout { endpoint, timeout }),
        }
    }
}

impl State {
    fn handle(&mut self, request: &ParsedFrame) -> Option<Bytes> {
        let Ok(command) = Command::try_from(request.message_type) else {
            return Some(nack_frame(request.message_type, 2));
        };
        let imm = request.immediate_data();
        let regs = &mut self.regs;

        let data: Vec<u8> = match command {
            Command::Reset => {
                regs.reset_count += 1;
                return None;
            }
            Command::GetSerial => regs.serial.as_bytes().to_vec(),
            Command::GetSerialLength => vec![16],
            Command::GetAlias => regs.alias.as_bytes().to_vec(),
            Command::GetAliasLength => vec![16],
            Command::GetHardwareRevision => vec![regs.hardware_revision],
            Command::GetFirmwareRevision => regs.firmware_revision.to_le_bytes().to_vec(),
            Command::GetUserStringCount => vec![regs.user_strings.len() as u8],
            Command::GetUserStringLength => 16u16.to_le_bytes().to_vec(),
            Command::GetUserString => match regs.user_strings.get(imm[0] as usize) {
                Some(s) => s.as_bytes().to_vec(),
                None => return Some(nack_frame(command.code(), 6)),
            },
            Command::GetCorrectedSpectrum | Command::GetRawSpectrum => {
                regs.spectrum.iter().flat_map(|s| s.to_le_bytes()).collect()
            }
            Command::GetPixelBinningFactor => vec![regs.pixel_binning],
            Command::GetMaxBinningFactor => vec![3],
            Command::GetDefaultBinningFactor => vec![regs.default_binning],
            Command::GetScansToAverage => regs.scans_to_average.to_le_bytes().to_vec(),
            Command::GetBoxcarWidth => vec![regs.boxcar],
            Command::GetWavelengthCoeffCount => vec![regs.wavelength_coeffs.len() as u8],
            Command::GetWavelengthCoeff => return Some(indexed(command, &regs.wavelength_coeffs, imm)),
            Command::GetNonlinearityCoeffCount => vec![regs.nonlinearity_coeffs.len() as u8],
            Command::GetNonlinearityCoeff => return Some(indexed(command, &regs.nonlinearity_coeffs, imm)),
            Command::GetStrayLightCoeffCount => vec![regs.stray_light_coeffs.len() as u8],
            Command::GetStrayLightCoeff => return Some(indexed(command, &regs.stray_light_coeffs, imm)),
            Command::GetIrradianceCalibration => match &regs.irradiance {
                Some(values) => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
                None => return Some(nack_frame(command.code(), 12)),
            },
            Command::GetIrradianceCalibrationCount => {
                let count = regs.irradiance.as_ref().map_or(0, Vec::len) as u32;
                count.to_le_bytes().to_vec()
            }
            Command::GetIrradianceCollectionArea => match regs.collection_area {
                Some(area) => area.to_le_bytes().to_vec(),
                None => return Some(nack_frame(command.code(), 12)),
            },
            Command::GetHotPixelIndices => regs.hot_pixels.iter().flat_map(|p| p.to_le_bytes()).collect(),
            Command::GetBenchId => regs.bench_id.as_bytes().to_vec(),
            Command::GetBenchSerial => b"B1234\0\0\0".to_vec(),
            Command::GetSlitWidth => regs.slit_width.to_le_bytes().to_vec(),
            Command::GetFiberDiameter => regs.fiber_diameter.to_le_bytes().to_vec(),
            Command::GetGrating => b"600 l/mm".to_vec(),
            Command::GetFilter => b"OD3\0".to_vec(),
            Command::GetCoating => b"none".to_vec(),
            Command::GetGpioPinCount => vec![4],
            Command::GetTemperatureSensorCount => vec![3],
            Command::ReadTemperatureSensor => match regs.temperatures.get(imm[0] as usize) {
                Some(t) => t.to_le_bytes().to_vec(),
                None => return Some(nack_frame(command.code(), 6)),
            },
            Command::ReadAllTemperatures => regs.temperatures.iter().flat_map(|t| t.to_le_bytes()).collect(),

            // Requests: apply and ACK.
            Command::ResetDefaults => {
                regs.pixel_binning = 0;
                regs.default_binning = 0;
                return Some(ack_frame(command));
            }
            Command::SetAlias => {
                regs.alias = String::from_utf8_lossy(imm).into_owned();
                return Some(ack_frame(command));
            }
            Command::SetUserString => {
                let data = if request.has_payload() { &request.payload[..] } else { imm };
                let index = data[0] as usize;
                match regs.user_strings.get_mut(index) {
                    Some(slot) => *slot = String::from_utf8_lossy(&data[1..]).into_owned(),
                    None => return Some(nack_frame(command.code(), 6)),
                }
                return Some(ack_frame(command));
            }
            Command::ConfigureStatusLed => {
                regs.led_pattern = imm[1];
                return Some(ack_frame(command));
            }
            Command::ReprogrammingMode | Command::SimulateTriggerPulse => return Some(ack_frame(command)),
            Command::SetIntegrationTime => {
                regs.integration_us = u32::from_le_bytes([imm[0], imm[1], imm[2], imm[3]]);
                return Some(ack_frame(command));
            }
            Command::SetTriggerMode => {
                regs.trigger_mode = imm[0];
                return Some(ack_frame(command));
            }
            Command::SetTriggerDelay => {
                regs.trigger_delay_us = u32::from_le_bytes([imm[0], imm[1], imm[2], imm[3]]);
                return Some(ack_frame(command));
            }
            Command::SetLampEnable => {
                regs.lamp = imm[0] != 0;
                return Some(ack_frame(command));
            }
            Command::SetPixelBinningFactor => {
                regs.pixel_binning = imm[0];
                return Some(ack_frame(command));
            }
            Command::SetDefaultBinningFactor => {
                regs.default_binning = imm.first().copied().unwrap_or(0);
                return Some(ack_frame(command));
            }
            Command::SetScansToAverage => {
                regs.scans_to_average = u16::from_le_bytes([imm[0], imm[1]]);
                return Some(ack_frame(command));
            }
            Command::SetBoxcarWidth => {
                regs.boxcar = imm[0];
                return Some(ack_frame(command));
            }
            Command::SetWavelengthCoeff => return Some(store_indexed(command, &mut regs.wavelength_coeffs, imm)),
            Command::SetNonlinearityCoeff => return Some(store_indexed(command, &mut regs.nonlinearity_coeffs, imm)),
            Command::SetStrayLightCoeff => return Some(store_indexed(command, &mut regs.stray_light_coeffs, imm)),
            Command::SetIrradianceCalibration => {
                let values: Vec<f32> = request
                    .payload
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect();
                regs.irradiance = if values.is_empty() { None } else { Some(values) };
                return Some(ack_frame(command));
            }
            Command::SetIrradianceCollectionArea => {
                regs.collection_area = Some(f32::from_le_bytes([imm[0], imm[1], imm[2], imm[3]]));
                return Some(ack_frame(command));
            }
            Command::SetHotPixelIndices => {
                let data = if request.has_payload() { &request.payload[..] } else { imm };
                regs.hot_pixels = data.chunks_exact(2).map(|b| u16::from_le_bytes([b[0], b[1]])).collect();
                return Some(ack_frame(command));
            }
        };
        Some(response_frame(command, &data))
    }
}

fn indexed(command: Command, values: &[f32], imm: &[u8]) -> Bytes {
    match values.get(imm[0] as usize) {
        Some(v) => response_frame(command, &v.to_le_bytes()),
        None => nack_frame(command.code(), 6),
    }
}

fn store_indexed(command: Command, values: &mut Vec<f32>, imm: &[u8]) -> Bytes {
    let index = imm[0] as usize;
    let value = f32::from_le_bytes([imm[1], imm[2], imm[3], imm[4]]);
    if index >= values.len() {
        values.resize(index + 1, 0.0);
    }
    values[index] = value;
    ack_frame(command)
}

/// ACK reply to a request.
#[allow(dead_code)]
pub fn ack_frame(command: Command) -> Bytes {
    Frame::new(command.code())
        .with_flags(Flags::new().with_response(true).with_ack(true))
        .encode()
        .unwrap()
}

/// Data reply: up to 16 bytes as immediate data, more as extended payload.
#[allow(dead_code)]
pub fn response_frame(command: Command, data: &[u8]) -> Bytes {
    let frame = Frame::new(command.code()).with_flags(Flags::new().with_response(true));
    let frame = if data.len() <= 16 {
        frame.with_immediate(Bytes::copy_from_slice(data))
    } else {
        frame.with_payload(Bytes::copy_from_slice(data))
    };
    frame.encode().unwrap()
}

#[allow(dead_code)]
pub fn nack_frame(message_type: u32, error_number: u16) -> Bytes {
    Frame::new(message_type)
        .with_flags(Flags::new().with_response(true).with_nack(true))
        .with_error_number(error_number)
        .encode()
        .unwrap()
}

/// Reply telling the driver the answer will come later.
#[allow(dead_code)]
pub fn deferred_frame(command: Command) -> Bytes {
    Frame::new(command.code())
        .with_flags(Flags::new().with_response(true))
        .with_error_number(255)
        .encode()
        .unwrap()
}

/// Routes driver logs to the test output. Honours `RUST_LOG`.
#[allow(dead_code)]
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A driver over a fresh simulator with all pauses removed, and a handle on
/// the simulator.
#[allow(dead_code)]
pub fn simulated() -> (Sts<SimulatedSts>, SimulatedSts) {
    simulated_with(DeviceConfig::without_delays())
}

#[allow(dead_code)]
pub fn simulated_with(config: DeviceConfig) -> (Sts<SimulatedSts>, SimulatedSts) {
    let sim = SimulatedSts::new();
    (Sts::new(sim.clone(), config), sim)
}

/// The most recent complete request frame.
#[allow(dead_code)]
pub fn last_request(sim: &SimulatedSts) -> ParsedFrame {
    sim.requests().pop().expect("no request was written")
}
