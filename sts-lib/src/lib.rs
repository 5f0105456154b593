pub mod analysis;
pub mod command;
pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod frame;
pub mod session;
pub mod transport;


// Re-export the main types for easy access
pub use command::Command;
pub use config::DeviceConfig;
pub use device::{StatusLedPattern, Sts, TemperatureSensor, TriggerMode};
pub use error::{DeviceErrorCode, StsError};
pub use transport::{Line, NusbTransport, UsbTransport, list_spectrometers};
