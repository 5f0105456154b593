//! Message types of the STS binary protocol.
//!
//! Every operation of the driver maps onto exactly one [`Command`]. The
//! [`CommandDescriptor`] table tells the session whether the device answers
//! with an ACK (a request) or with data (a query), and whether the request may
//! carry an extended payload.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;
use strum_macros::IntoStaticStr;

/// Whether the device acknowledges a command or answers it with data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Expects a frame with the ACK flag.
    Request,
    /// Expects a frame with the RESPONSE flag carrying data.
    Query,
}

/// Static description of one protocol operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub code: u32,
    /// The request may carry an extended payload beyond the immediate data.
    pub expects_payload: bool,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive, IntoStaticStr)]
#[repr(u32)]
pub enum Command {
    // General
    Reset = 0x0000_0000,
    ResetDefaults = 0x0000_0001,
    GetHardwareRevision = 0x0000_0080,
    GetFirmwareRevision = 0x0000_0090,
    GetSerial = 0x0000_0100,
    GetSerialLength = 0x0000_0101,
    GetAlias = 0x0000_0200,
    GetAliasLength = 0x0000_0201,
    SetAlias = 0x0000_0210,
    GetUserStringCount = 0x0000_0300,
    GetUserStringLength = 0x0000_0301,
    GetUserString = 0x0000_0302,
    SetUserString = 0x0000_0310,
    ConfigureStatusLed = 0x0000_1010,
    ReprogrammingMode = 0x000F_FF00,

    // Spectrometer
    GetCorrectedSpectrum = 0x0010_1000,
    GetRawSpectrum = 0x0010_1100,
    SetIntegrationTime = 0x0011_0010,
    SetTriggerMode = 0x0011_0110,
    SimulateTriggerPulse = 0x0011_0120,
    GetPixelBinningFactor = 0x0011_0280,
    GetMaxBinningFactor = 0x0011_0281,
    GetDefaultBinningFactor = 0x0011_0285,
    SetPixelBinningFactor = 0x0011_0290,
    SetDefaultBinningFactor = 0x0011_0295,
    SetLampEnable = 0x0011_0410,
    SetTriggerDelay = 0x0011_0510,
    GetScansToAverage = 0x0012_0000,
    SetScansToAverage = 0x0012_0010,
    GetBoxcarWidth = 0x0012_1000,
    SetBoxcarWidth = 0x0012_1010,

    // Calibration
    GetWavelengthCoeffCount = 0x0018_0100,
    GetWavelengthCoeff = 0x0018_0101,
    SetWavelengthCoeff = 0x0018_0111,
    GetNonlinearityCoeffCount = 0x0018_1100,
    GetNonlinearityCoeff = 0x0018_1101,
    SetNonlinearityCoeff = 0x0018_1111,
    GetIrradianceCalibration = 0x0018_2001,
    GetIrradianceCalibrationCount = 0x0018_2002,
    GetIrradianceCollectionArea = 0x0018_2003,
    SetIrradianceCalibration = 0x0018_2010,
    SetIrradianceCollectionArea = 0x0018_2011,
    GetStrayLightCoeffCount = 0x0018_3100,
    GetStrayLightCoeff = 0x0018_3101,
    SetStrayLightCoeff = 0x0018_3111,
    GetHotPixelIndices = 0x0018_6000,
    SetHotPixelIndices = 0x0018_6010,

    // Optical bench
    GetBenchId = 0x001B_0000,
    GetBenchSerial = 0x001B_0100,
    GetSlitWidth = 0x001B_0200,
    GetFiberDiameter = 0x001B_0300,
    GetGrating = 0x001B_0400,
    GetFilter = 0x001B_0500,
    GetCoating = 0x001B_0600,

    // GPIO
    GetGpioPinCount = 0x0020_0000,

    // Temperature
    GetTemperatureSensorCount = 0x0040_0000,
    ReadTemperatureSensor = 0x0040_0001,
    ReadAllTemperatures = 0x0040_0002,
}

impl Command {
    pub fn code(self) -> u32 {
        self.into()
    }

    pub fn name(self) -> &'static str {
        self.into()
    }

    pub const fn descriptor(self) -> CommandDescriptor {
        use Command::*;
        let (expects_payload, direction) = match self {
            SetUserString | SetIrradianceCalibration | SetHotPixelIndices => (true, Direction::Request),

            Reset
            | ResetDefaults
            | SetAlias
            | ConfigureStatusLed
            | ReprogrammingMode
            | SetIntegrationTime
            | SetTriggerMode
            | SimulateTriggerPulse
            | SetPixelBinningFactor
            | SetDefaultBinningFactor
            | SetLampEnable
            | SetTriggerDelay
            | SetScansToAverage
            | SetBoxcarWidth
            | SetWavelengthCoeff
            | SetNonlinearityCoeff
            | SetIrradianceCollectionArea
            | SetStrayLightCoeff => (false, Direction::Request),

            GetHardwareRevision
            | GetFirmwareRevision
            | GetSerial
            | GetSerialLength
            | GetAlias
            | GetAliasLength
            | GetUserStringCount
            | GetUserStringLength
            | GetUserString
            | GetCorrectedSpectrum
            | GetRawSpectrum
            | GetPixelBinningFactor
            | GetMaxBinningFactor
            | GetDefaultBinningFactor
            | GetScansToAverage
            | GetBoxcarWidth
            | GetWavelengthCoeffCount
            | GetWavelengthCoeff
            | GetNonlinearityCoeffCount
            | GetNonlinearityCoeff
            | GetIrradianceCalibration
            | GetIrradianceCalibrationCount
            | GetIrradianceCollectionArea
            | GetStrayLightCoeffCount
            | GetStrayLightCoeff
            | GetHotPixelIndices
            | GetBenchId
            | GetBenchSerial
            | GetSlitWidth
            | GetFiberDiameter
            | GetGrating
            | GetFilter
            | GetCoating
            | GetGpioPinCount
            | GetTemperatureSensorCount
            | ReadTemperatureSensor
            | ReadAllTemperatures => (false, Direction::Query),
        };
        CommandDescriptor {
            code: self as u32,
            expects_payload,
            direction,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#010x})", self.name(), self.code())
    }
}
