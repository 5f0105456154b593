//! Typed operations of the STS spectrometer.
//!
//! Every method validates its arguments before touching the bus, so an
//! out-of-range value fails with [`StsError::InvalidArgument`] and nothing is
//! written. Operations this driver does not implement fail with
//! [`StsError::NotSupported`], also without any traffic.

use crate::analysis;
use crate::command::Command;
use crate::config::DeviceConfig;
use crate::constants::{IMMEDIATE_DATA_SIZE, MAX_PAYLOAD_SIZE};
use crate::error::{DeviceErrorCode, StsError};
use crate::frame::Frame;
use crate::session::Session;
use crate::transport::{Line, NusbTransport, UsbTransport};
use bytes::{BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::ops::RangeInclusive;
use strum_macros::Display;
use tracing::{info, warn};

pub const SCANS_TO_AVERAGE: RangeInclusive<u16> = 1..=5000;
pub const BOXCAR_WIDTH: RangeInclusive<u8> = 0..=15;
pub const BINNING_FACTOR: RangeInclusive<u8> = 0..=3;
/// Integration time limits in microseconds.
pub const INTEGRATION_TIME_US: RangeInclusive<u32> = 10..=85_000_000;
pub const ALIAS_MAX_LEN: usize = 16;
pub const USER_STRING_MAX_LEN: usize = 348;
pub const HOT_PIXEL_MAX_COUNT: usize = 52;
pub const IRRADIANCE_MAX_VALUES: usize = MAX_PAYLOAD_SIZE / 4;

// The regarding field sent with user string writes.
const USER_STRING_REGARDING: u32 = 0x0200_0100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum TriggerMode {
    /// Integration begins as soon as possible after the request.
    #[strum(to_string = "normal")]
    Normal = 0,
    /// Integration or trigger delay begins with a rising trigger edge.
    #[strum(to_string = "external edge")]
    ExternalEdge = 1,
    /// Integration is synchronized with the continuous strobe.
    #[strum(to_string = "internal sync")]
    InternalSync = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum StatusLedPattern {
    /// High priority S-O-S blink.
    Sos = 1,
    /// Low priority fade in and out.
    Fade = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum TemperatureSensor {
    #[strum(to_string = "detector board")]
    DetectorBoard = 0,
    #[strum(to_string = "reserved")]
    Reserved = 1,
    #[strum(to_string = "microcontroller")]
    Microcontroller = 2,
}

/// Represents a connection to an Ocean Optics STS spectrometer.
pub struct Sts<T = NusbTransport> {
    session: Session<T>,
}

impl Sts<NusbTransport> {
    /// Opens the configured spectrometer and reads its serial number.
    pub async fn open(config: DeviceConfig) -> Result<Self, StsError> {
        let transport = NusbTransport::open(&config)?;
        let sts = Self::new(transport, config);
        let serial = sts.get_serial(Line::One).await?;
        info!("Connected to STS serial {}", serial);
        Ok(sts)
    }
}

impl<T: UsbTransport> Sts<T> {
    pub fn new(transport: T, config: DeviceConfig) -> Self {
        Self {
            session: Session::new(transport, config),
        }
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    // --- General ---

    /// Resets the device. The connection cannot be used afterwards.
    ///
    /// The device detaches transiently, so transport errors are logged and
    /// swallowed. Returns after the configured settle delay.
    pub async fn reset(self, line: Line) {
        if let Err(e) = self.session.send(Command::Reset, line, &[], None).await {
            warn!("Ignoring error from reset: {}", e);
        }
        let settle = self.session.config().reset_settle();
        tokio::time::sleep(settle).await;
        info!("Device reset, connection closed");
    }

    /// Clears persisted settings such as the binning mode. Serial number,
    /// bench data, alias, calibration and user strings are kept.
    pub async fn reset_defaults(&self, line: Line) -> Result<(), StsError> {
        self.session.send(Command::ResetDefaults, line, &[], None).await
    }

    pub async fn get_hardware_revision(&self, line: Line) -> Result<u8, StsError> {
        self.query_u8(Command::GetHardwareRevision, line).await
    }

    /// Firmware version as binary coded decimal.
    pub async fn get_firmware_revision(&self, line: Line) -> Result<u16, StsError> {
        self.query_u16(Command::GetFirmwareRevision, line).await
    }

    pub async fn get_serial(&self, line: Line) -> Result<String, StsError> {
        self.query_ascii(Command::GetSerial, line, &[]).await
    }

    /// Maximum length of the serial number string.
    pub async fn get_serial_length(&self, line: Line) -> Result<u8, StsError> {
        self.query_u8(Command::GetSerialLength, line).await
    }

    pub async fn get_alias(&self, line: Line) -> Result<String, StsError> {
        self.query_ascii(Command::GetAlias, line, &[]).await
    }

    pub async fn get_alias_length(&self, line: Line) -> Result<u8, StsError> {
        self.query_u8(Command::GetAliasLength, line).await
    }

    pub async fn set_alias(&self, alias: &str, line: Line) -> Result<(), StsError> {
        let command = Command::SetAlias;
        check_ascii(command, alias)?;
        if alias.len() > ALIAS_MAX_LEN {
            return Err(StsError::invalid(
                command,
                format!("alias is {} characters, at most {} allowed", alias.len(), ALIAS_MAX_LEN),
            ));
        }
        self.session.send(command, line, alias.as_bytes(), None).await
    }

    pub async fn get_user_string_count(&self, line: Line) -> Result<u8, StsError> {
        self.query_u8(Command::GetUserStringCount, line).await
    }

    pub async fn get_user_string_length(&self, line: Line) -> Result<u16, StsError> {
        self.query_u16(Command::GetUserStringLength, line).await
    }

    pub async fn get_user_string(&self, index: u8, line: Line) -> Result<String, StsError> {
        self.query_ascii(Command::GetUserString, line, &[index]).await
    }

    /// Stores a user string. Strings up to 15 characters travel as immediate
    /// data, longer ones as extended payload.
    pub async fn set_user_string(&self, index: u8, text: &str, line: Line) -> Result<(), StsError> {
        let command = Command::SetUserString;
        check_ascii(command, text)?;
        if text.len() > USER_STRING_MAX_LEN {
            return Err(StsError::invalid(
                command,
                format!(
                    "user string is {} characters, at most {} allowed",
                    text.len(),
                    USER_STRING_MAX_LEN
                ),
            ));
        }

        let mut data = BytesMut::with_capacity(text.len() + 1);
        data.put_u8(index);
        data.put_slice(text.as_bytes());
        let data = data.freeze();

        let frame = Frame::new(command.code()).with_regarding(USER_STRING_REGARDING);
        let frame = if data.len() <= IMMEDIATE_DATA_SIZE {
            frame.with_immediate(data)
        } else {
            frame.with_payload(data)
        };
        self.session.send_frame(command, line, frame).await
    }

    pub async fn configure_status_led(&self, pattern: StatusLedPattern, line: Line) -> Result<(), StsError> {
        // Byte 0 is reserved and must be zero.
        self.session
            .send(Command::ConfigureStatusLed, line, &[0, u8::from(pattern)], None)
            .await
    }

    /// Puts the device into firmware reprogramming mode.
    pub async fn reprogramming_mode(&self, line: Line) -> Result<(), StsError> {
        self.session.send(Command::ReprogrammingMode, line, &[], None).await
    }

    // --- Spectrometer ---

    /// Intensity of every detector pixel, with the device's corrections applied.
    pub async fn get_corrected_spectrum(&self, line: Line) -> Result<Vec<f64>, StsError> {
        let command = Command::GetCorrectedSpectrum;
        let data = self.session.query(command, line, &[]).await?;
        decode_samples(command, &data)
    }

    /// Raw ADC output of every detector pixel.
    pub async fn get_raw_spectrum(&self, line: Line) -> Result<Vec<f64>, StsError> {
        let command = Command::GetRawSpectrum;
        let data = self.session.query(command, line, &[]).await?;
        decode_samples(command, &data)
    }

    pub async fn get_partial_spectrum_mode(&self, _line: Line) -> Result<Vec<u8>, StsError> {
        Err(StsError::NotSupported("get_partial_spectrum_mode"))
    }

    pub async fn set_partial_spectrum_mode(&self, _mode: &[u8], _line: Line) -> Result<(), StsError> {
        Err(StsError::NotSupported("set_partial_spectrum_mode"))
    }

    pub async fn get_partial_corrected_spectrum(&self, _line: Line) -> Result<Vec<f64>, StsError> {
        Err(StsError::NotSupported("get_partial_corrected_spectrum"))
    }

    /// Sets the integration time, then waits for the device to settle.
    pub async fn set_integration_time(&self, microseconds: u32, line: Line) -> Result<(), StsError> {
        let command = Command::SetIntegrationTime;
        check_range(command, "integration time (us)", microseconds, &INTEGRATION_TIME_US)?;
        self.session
            .send(command, line, &microseconds.to_le_bytes(), None)
            .await?;
        let settle = self.session.config().integration_settle();
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
        Ok(())
    }

    /// Sets the trigger mode, one of the [`TriggerMode`] values.
    pub async fn set_trigger_mode(&self, mode: u8, line: Line) -> Result<(), StsError> {
        let command = Command::SetTriggerMode;
        let mode = TriggerMode::try_from(mode)
            .map_err(|_| StsError::invalid(command, format!("trigger mode {} is not 0, 1 or 2", mode)))?;
        self.session.send(command, line, &[u8::from(mode)], None).await
    }

    /// Acts as though a rising edge arrived on the external trigger pin.
    pub async fn simulate_trigger_pulse(&self, line: Line) -> Result<(), StsError> {
        self.session.send(Command::SimulateTriggerPulse, line, &[], None).await
    }

    pub async fn get_pixel_binning_factor(&self, line: Line) -> Result<u8, StsError> {
        self.query_u8(Command::GetPixelBinningFactor, line).await
    }

    pub async fn get_max_binning_factor(&self, line: Line) -> Result<u8, StsError> {
        self.query_u8(Command::GetMaxBinningFactor, line).await
    }

    pub async fn get_default_binning_factor(&self, line: Line) -> Result<u8, StsError> {
        self.query_u8(Command::GetDefaultBinningFactor, line).await
    }

    /// Binning factor used on this bus until the device is reset.
    pub async fn set_pixel_binning_factor(&self, factor: u8, line: Line) -> Result<(), StsError> {
        let command = Command::SetPixelBinningFactor;
        check_range(command, "binning factor", factor, &BINNING_FACTOR)?;
        self.session.send(command, line, &[factor], None).await
    }

    /// Startup binning factor. `None` restores the factory default.
    pub async fn set_default_binning_factor(&self, factor: Option<u8>, line: Line) -> Result<(), StsError> {
        let command = Command::SetDefaultBinningFactor;
        match factor {
            Some(factor) => {
                check_range(command, "binning factor", factor, &BINNING_FACTOR)?;
                self.session.send(command, line, &[factor], None).await
            }
            None => self.session.send(command, line, &[], None).await,
        }
    }

    /// Drives the external lamp enable pin from the next acquisition on.
    pub async fn set_lamp_enable(&self, enable: bool, line: Line) -> Result<(), StsError> {
        self.session
            .send(Command::SetLampEnable, line, &[u8::from(enable)], None)
            .await
    }

    pub async fn set_trigger_delay(&self, microseconds: u32, line: Line) -> Result<(), StsError> {
        self.session
            .send(Command::SetTriggerDelay, line, &microseconds.to_le_bytes(), None)
            .await
    }

    /// Scans to average. The setting is held per line.
    pub async fn get_scans_to_avg(&self, line: Line) -> Result<u16, StsError> {
        self.query_u16(Command::GetScansToAverage, line).await
    }

    pub async fn set_scans_to_avg(&self, scans: u16, line: Line) -> Result<(), StsError> {
        let command = Command::SetScansToAverage;
        check_range(command, "scans to average", scans, &SCANS_TO_AVERAGE)?;
        self.session.send(command, line, &scans.to_le_bytes(), None).await
    }

    pub async fn get_boxcar(&self, line: Line) -> Result<u8, StsError> {
        self.query_u8(Command::GetBoxcarWidth, line).await
    }

    /// Boxcar smoothing width, applied to every pixel even at the detector edges.
    pub async fn set_boxcar(&self, width: u8, line: Line) -> Result<(), StsError> {
        let command = Command::SetBoxcarWidth;
        check_range(command, "boxcar width", width, &BOXCAR_WIDTH)?;
        self.session.send(command, line, &[width], None).await
    }

    // --- Calibration ---

    pub async fn get_wav_coeff_count(&self, line: Line) -> Result<u8, StsError> {
        self.query_u8(Command::GetWavelengthCoeffCount, line).await
    }

    pub async fn get_wav_coeff(&self, index: u8, line: Line) -> Result<f32, StsError> {
        self.query_indexed_f32(Command::GetWavelengthCoeff, index, line).await
    }

    pub async fn set_wav_coeff(&self, index: u8, coeff: f32, line: Line) -> Result<(), StsError> {
        self.send_indexed_f32(Command::SetWavelengthCoeff, index, coeff, line).await
    }

    pub async fn get_nonlin_coeff_count(&self, line: Line) -> Result<u8, StsError> {
        self.query_u8(Command::GetNonlinearityCoeffCount, line).await
    }

    pub async fn get_nonlin_coeff(&self, index: u8, line: Line) -> Result<f32, StsError> {
        self.query_indexed_f32(Command::GetNonlinearityCoeff, index, line).await
    }

    pub async fn set_nonlin_coeff(&self, index: u8, coeff: f32, line: Line) -> Result<(), StsError> {
        self.send_indexed_f32(Command::SetNonlinearityCoeff, index, coeff, line).await
    }

    /// Stored irradiance calibration, `None` if nothing has been stored.
    pub async fn get_irrad_calib(&self, line: Line) -> Result<Option<Vec<f32>>, StsError> {
        let command = Command::GetIrradianceCalibration;
        match self.session.query(command, line, &[]).await {
            Ok(data) => decode_f32s(command, &data).map(Some),
            Err(e) => absent_on_no_data(e),
        }
    }

    /// Number of floats `get_irrad_calib` returns, zeros included.
    pub async fn get_irrad_calib_count(&self, line: Line) -> Result<u32, StsError> {
        let command = Command::GetIrradianceCalibrationCount;
        let data = self.session.query(command, line, &[]).await?;
        decode_u32(command, &data)
    }

    /// Collection area for the irradiance calibration, `None` if not set.
    pub async fn get_irrad_calib_area(&self, line: Line) -> Result<Option<f32>, StsError> {
        let command = Command::GetIrradianceCollectionArea;
        match self.session.query(command, line, &[]).await {
            Ok(data) => decode_f32(command, &data).map(Some),
            Err(e) => absent_on_no_data(e),
        }
    }

    /// Stores up to 1024 calibration values. An empty slice deletes the
    /// stored calibration.
    pub async fn set_irrad_calib(&self, values: &[f32], line: Line) -> Result<(), StsError> {
        let command = Command::SetIrradianceCalibration;
        if values.len() > IRRADIANCE_MAX_VALUES {
            return Err(StsError::invalid(
                command,
                format!(
                    "{} calibration values, at most {} allowed",
                    values.len(),
                    IRRADIANCE_MAX_VALUES
                ),
            ));
        }
        let mut payload = BytesMut::with_capacity(values.len() * 4);
        for value in values {
            payload.put_f32_le(*value);
        }
        self.session.send(command, line, &[], Some(&payload[..])).await
    }

    pub async fn set_irrad_calib_area(&self, area: f32, line: Line) -> Result<(), StsError> {
        self.session
            .send(Command::SetIrradianceCollectionArea, line, &area.to_le_bytes(), None)
            .await
    }

    pub async fn get_stray_light_coeff_count(&self, line: Line) -> Result<u8, StsError> {
        self.query_u8(Command::GetStrayLightCoeffCount, line).await
    }

    pub async fn get_stray_light_coeff(&self, order: u8, line: Line) -> Result<f32, StsError> {
        self.query_indexed_f32(Command::GetStrayLightCoeff, order, line).await
    }

    pub async fn set_stray_light_coeff(&self, order: u8, coeff: f32, line: Line) -> Result<(), StsError> {
        self.send_indexed_f32(Command::SetStrayLightCoeff, order, coeff, line).await
    }

    pub async fn get_hot_pixel_indices(&self, line: Line) -> Result<Vec<u16>, StsError> {
        let command = Command::GetHotPixelIndices;
        let data = self.session.query(command, line, &[]).await?;
        decode_u16s(command, &data)
    }

    /// Replaces the stored hot pixel list. Read the current list first to
    /// extend it.
    pub async fn set_hot_pixel_indices(&self, indices: &[u16], line: Line) -> Result<(), StsError> {
        let command = Command::SetHotPixelIndices;
        if indices.len() > HOT_PIXEL_MAX_COUNT {
            return Err(StsError::invalid(
                command,
                format!("{} hot pixels, at most {} allowed", indices.len(), HOT_PIXEL_MAX_COUNT),
            ));
        }
        let mut data = BytesMut::with_capacity(indices.len() * 2);
        for index in indices {
            data.put_u16_le(*index);
        }
        if data.len() <= IMMEDIATE_DATA_SIZE {
            self.session.send(command, line, &data, None).await
        } else {
            self.session.send(command, line, &[], Some(&data[..])).await
        }
    }

    // --- Optical bench ---

    pub async fn get_bench_id(&self, line: Line) -> Result<String, StsError> {
        self.query_ascii(Command::GetBenchId, line, &[]).await
    }

    pub async fn get_bench_serial(&self, line: Line) -> Result<String, StsError> {
        self.query_ascii(Command::GetBenchSerial, line, &[]).await
    }

    /// Slit width in micrometres.
    pub async fn get_slit_width(&self, line: Line) -> Result<u16, StsError> {
        self.query_u16(Command::GetSlitWidth, line).await
    }

    /// Fiber diameter in micrometres.
    pub async fn get_fiber_diameter(&self, line: Line) -> Result<u16, StsError> {
        self.query_u16(Command::GetFiberDiameter, line).await
    }

    pub async fn get_grating(&self, line: Line) -> Result<String, StsError> {
        self.query_ascii(Command::GetGrating, line, &[]).await
    }

    pub async fn get_filter(&self, line: Line) -> Result<String, StsError> {
        self.query_ascii(Command::GetFilter, line, &[]).await
    }

    pub async fn get_coating(&self, line: Line) -> Result<String, StsError> {
        self.query_ascii(Command::GetCoating, line, &[]).await
    }

    // --- GPIO ---

    pub async fn get_gpio_pin_count(&self, line: Line) -> Result<u8, StsError> {
        self.query_u8(Command::GetGpioPinCount, line).await
    }

    pub async fn get_output_enable_vector(&self, _line: Line) -> Result<u32, StsError> {
        Err(StsError::NotSupported("get_output_enable_vector"))
    }

    pub async fn set_output_enable_vector(&self, _vector: u32, _mask: u32, _line: Line) -> Result<(), StsError> {
        Err(StsError::NotSupported("set_output_enable_vector"))
    }

    pub async fn get_value_vector(&self, _line: Line) -> Result<u32, StsError> {
        Err(StsError::NotSupported("get_value_vector"))
    }

    pub async fn set_value_vector(&self, _vector: u32, _mask: u32, _line: Line) -> Result<(), StsError> {
        Err(StsError::NotSupported("set_value_vector"))
    }

    // --- Strobe ---

    pub async fn set_single_strobe_pulse_delay(&self, _microseconds: u32, _line: Line) -> Result<(), StsError> {
        Err(StsError::NotSupported("set_single_strobe_pulse_delay"))
    }

    pub async fn set_single_strobe_pulse_width(&self, _microseconds: u32, _line: Line) -> Result<(), StsError> {
        Err(StsError::NotSupported("set_single_strobe_pulse_width"))
    }

    pub async fn set_single_strobe_enable(&self, _enable: bool, _line: Line) -> Result<(), StsError> {
        Err(StsError::NotSupported("set_single_strobe_enable"))
    }

    pub async fn set_cont_strobe_period(&self, _microseconds: u32, _line: Line) -> Result<(), StsError> {
        Err(StsError::NotSupported("set_cont_strobe_period"))
    }

    pub async fn set_cont_strobe_enable(&self, _enable: bool, _line: Line) -> Result<(), StsError> {
        Err(StsError::NotSupported("set_cont_strobe_enable"))
    }

    // --- Temperature ---

    pub async fn get_temperature_sensor_count(&self, line: Line) -> Result<u8, StsError> {
        self.query_u8(Command::GetTemperatureSensorCount, line).await
    }

    /// Temperature of one sensor in degrees Celsius.
    pub async fn read_temperature_sensor(&self, sensor: TemperatureSensor, line: Line) -> Result<f32, StsError> {
        let command = Command::ReadTemperatureSensor;
        let data = self.session.query(command, line, &[u8::from(sensor)]).await?;
        decode_f32(command, &data)
    }

    /// Temperatures of all three sensors, indexed like [`TemperatureSensor`].
    pub async fn read_all_temperatures(&self, line: Line) -> Result<[f32; 3], StsError> {
        let command = Command::ReadAllTemperatures;
        let data = self.session.query(command, line, &[]).await?;
        let values = decode_f32s(command, &data)?;
        values.get(..3).and_then(|v| <[f32; 3]>::try_from(v).ok()).ok_or_else(|| {
            StsError::malformed(format!("reply has {} bytes, expected 12", data.len())).in_reply_to(command)
        })
    }

    // --- Composites ---

    /// Wavelength in nanometres of each of `pixels` pixels, from the stored
    /// wavelength calibration polynomial.
    pub async fn wavelengths(&self, pixels: usize, line: Line) -> Result<Vec<f64>, StsError> {
        let count = self.get_wav_coeff_count(line).await?;
        let mut coeffs = Vec::with_capacity(count as usize);
        for index in 0..count {
            coeffs.push(self.get_wav_coeff(index, line).await? as f64);
        }
        Ok(analysis::wavelengths(&coeffs, pixels))
    }

    pub async fn nonlinearity_coefficients(&self, line: Line) -> Result<Vec<f32>, StsError> {
        let count = self.get_nonlin_coeff_count(line).await?;
        let mut coeffs = Vec::with_capacity(count as usize);
        for index in 0..count {
            coeffs.push(self.get_nonlin_coeff(index, line).await?);
        }
        Ok(coeffs)
    }

    // --- Helpers ---

    async fn query_u8(&self, command: Command, line: Line) -> Result<u8, StsError> {
        let data = self.session.query(command, line, &[]).await?;
        data.first().copied().ok_or_else(|| too_short(command, data.len(), 1))
    }

    async fn query_u16(&self, command: Command, line: Line) -> Result<u16, StsError> {
        let data = self.session.query(command, line, &[]).await?;
        decode_u16(command, &data)
    }

    async fn query_ascii(&self, command: Command, line: Line, immediate: &[u8]) -> Result<String, StsError> {
        let data = self.session.query(command, line, immediate).await?;
        Ok(decode_ascii(&data))
    }

    async fn query_indexed_f32(&self, command: Command, index: u8, line: Line) -> Result<f32, StsError> {
        let data = self.session.query(command, line, &[index]).await?;
        decode_f32(command, &data)
    }

    async fn send_indexed_f32(&self, command: Command, index: u8, value: f32, line: Line) -> Result<(), StsError> {
        let mut data = [0u8; 5];
        data[0] = index;
        data[1..].copy_from_slice(&value.to_le_bytes());
        self.session.send(command, line, &data, None).await
    }
}

fn check_range<N>(command: Command, what: &str, value: N, range: &RangeInclusive<N>) -> Result<(), StsError>
where
    N: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(StsError::invalid(
            command,
            format!("{} {} outside {}..={}", what, value, range.start(), range.end()),
        ))
    }
}

fn check_ascii(command: Command, text: &str) -> Result<(), StsError> {
    if text.is_ascii() {
        Ok(())
    } else {
        Err(StsError::invalid(command, format!("{:?} is not ASCII", text)))
    }
}

fn absent_on_no_data<V>(err: StsError) -> Result<Option<V>, StsError> {
    match err {
        StsError::Device {
            code: DeviceErrorCode::NoData,
            ..
        } => Ok(None),
        e => Err(e),
    }
}

fn too_short(command: Command, actual: usize, expected: usize) -> StsError {
    StsError::malformed(format!("reply has {} bytes, expected {}", actual, expected)).in_reply_to(command)
}

fn decode_u16(command: Command, data: &[u8]) -> Result<u16, StsError> {
    let bytes = data.get(..2).ok_or_else(|| too_short(command, data.len(), 2))?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn decode_u32(command: Command, data: &[u8]) -> Result<u32, StsError> {
    let bytes: [u8; 4] = data
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| too_short(command, data.len(), 4))?;
    Ok(u32::from_le_bytes(bytes))
}

fn decode_f32(command: Command, data: &[u8]) -> Result<f32, StsError> {
    decode_u32(command, data).map(f32::from_bits)
}

fn decode_f32s(command: Command, data: &[u8]) -> Result<Vec<f32>, StsError> {
    if data.len() % 4 != 0 {
        return Err(StsError::malformed(format!(
            "reply has {} bytes, not a whole number of floats",
            data.len()
        ))
        .in_reply_to(command));
    }
    Ok(data
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn decode_u16s(command: Command, data: &[u8]) -> Result<Vec<u16>, StsError> {
    if data.len() % 2 != 0 {
        return Err(StsError::malformed(format!(
            "reply has {} bytes, not a whole number of 16-bit values",
            data.len()
        ))
        .in_reply_to(command));
    }
    Ok(data.chunks_exact(2).map(|b| u16::from_le_bytes([b[0], b[1]])).collect())
}

fn decode_samples(command: Command, data: &[u8]) -> Result<Vec<f64>, StsError> {
    Ok(decode_u16s(command, data)?.into_iter().map(f64::from).collect())
}

/// One character per byte, trailing NULs stripped.
fn decode_ascii(data: &[u8]) -> String {
    let text: String = data.iter().map(|&b| b as char).collect();
    text.trim_end_matches('\0').to_string()
}
