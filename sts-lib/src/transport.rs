use crate::config::DeviceConfig;
use crate::constants::*;
use crate::error::StsError;
use nusb::transfer::RequestBuffer;
use nusb::{DeviceInfo, Interface};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::future::Future;
use std::time::Duration;
use strum_macros::Display;
use tracing::info;

/// One of the two logical communication lines of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Line {
    #[strum(to_string = "line 1")]
    One = 1,
    #[strum(to_string = "line 2")]
    Two = 2,
}

impl Line {
    pub fn endpoint_out(self) -> u8 {
        match self {
            Line::One => LINE1_ENDPOINT_OUT,
            Line::Two => LINE2_ENDPOINT_OUT,
        }
    }

    pub fn endpoint_in(self) -> u8 {
        match self {
            Line::One => LINE1_ENDPOINT_IN,
            Line::Two => LINE2_ENDPOINT_IN,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Line::One => 0,
            Line::Two => 1,
        }
    }
}

/// Bulk transfer primitives the session is built on.
///
/// Both methods take `&self` so that the two lines can be driven concurrently.
pub trait UsbTransport: Send + Sync {
    /// Writes `data` to an OUT endpoint, returning the number of bytes sent.
    fn write(&self, endpoint: u8, data: Vec<u8>) -> impl Future<Output = Result<usize, StsError>> + Send;

    /// Reads at most `max_len` bytes from an IN endpoint.
    fn read(
        &self,
        endpoint: u8,
        max_len: usize,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<u8>, StsError>> + Send;
}

/// Bulk transport over a claimed `nusb` interface.
#[derive(Clone)]
pub struct NusbTransport {
    interface: Interface,
    write_timeout: Duration,
}

impl NusbTransport {
    pub fn new(interface: Interface, write_timeout: Duration) -> Self {
        Self {
            interface,
            write_timeout,
        }
    }

    /// Finds the configured spectrometer by index and claims its interface.
    pub fn open(config: &DeviceConfig) -> Result<Self, StsError> {
        info!("Searching for Ocean Optics STS...");
        let mut devices = list_spectrometers(config.vendor_id, config.product_id)?;
        if devices.is_empty() {
            return Err(StsError::DeviceNotFound);
        }
        let found = devices.len();
        if config.device_index >= found {
            return Err(StsError::IndexOutOfRange {
                index: config.device_index,
                found,
            });
        }
        let device_info = devices.swap_remove(config.device_index);

        info!(
            "Found device on bus {} addr {} (index {} of {})",
            device_info.bus_number(),
            device_info.device_address(),
            config.device_index,
            found
        );

        let device = device_info.open()?;
        let interface = device.detach_and_claim_interface(0)?;
        info!("Interface claimed successfully.");

        Ok(Self::new(interface, config.write_timeout()))
    }
}

impl UsbTransport for NusbTransport {
    async fn write(&self, endpoint: u8, data: Vec<u8>) -> Result<usize, StsError> {
        let transfer = self.interface.bulk_out(endpoint, data);
        let completion = tokio::time::timeout(self.write_timeout, transfer)
            .await
            .map_err(|_| StsError::TransportTimeout {
                endpoint,
                timeout: self.write_timeout,
            })?;
        let sent = completion.into_result()?;
        Ok(sent.actual_length())
    }

    async fn read(&self, endpoint: u8, max_len: usize, timeout: Duration) -> Result<Vec<u8>, StsError> {
        let transfer = self.interface.bulk_in(endpoint, RequestBuffer::new(max_len));
        let completion = tokio::time::timeout(timeout, transfer)
            .await
            .map_err(|_| StsError::TransportTimeout { endpoint, timeout })?;
        Ok(completion.into_result()?)
    }
}

/// Lists attached devices matching the vendor/product pair, in enumeration order.
pub fn list_spectrometers(vendor_id: u16, product_id: u16) -> Result<Vec<DeviceInfo>, StsError> {
    Ok(nusb::list_devices()?
        .filter(|d| d.vendor_id() == vendor_id && d.product_id() == product_id)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_endpoints() {
        assert_eq!(Line::One.endpoint_out(), 0x01);
        assert_eq!(Line::One.endpoint_in(), 0x81);
        assert_eq!(Line::Two.endpoint_out(), 0x02);
        assert_eq!(Line::Two.endpoint_in(), 0x82);
    }

    #[test]
    fn line_from_number() {
        assert_eq!(Line::try_from(2u8).ok(), Some(Line::Two));
        assert!(Line::try_from(3u8).is_err());
        assert_eq!(Line::One.to_string(), "line 1");
    }
}
