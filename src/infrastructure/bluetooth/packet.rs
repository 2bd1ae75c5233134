//! Location packet encoder
//!
//! Layout (95 bytes, big-endian):
//!
//! ```text
//! offset  len  field
//!      0   11  fixed header
//!     11    4  latitude  * 1e7 (i32)
//!     15    4  longitude * 1e7 (i32)
//!     19    2  year (i16)
//!     21    5  month, day, hour, minute, second (u8 each)
//!     26   65  zero padding
//!     91    2  UTC offset in minutes (i16)
//!     93    2  DST offset in minutes (i16)
//! ```

use crate::domain::models::GeoFix;
use chrono::{Datelike, NaiveDateTime, Timelike};
use thiserror::Error;

pub const PACKET_LEN: usize = 95;

pub const PACKET_HEADER: [u8; 11] = [
    0x00, 0x5D, 0x08, 0x02, 0xFC, 0x03, 0x00, 0x00, 0x10, 0x10, 0x10,
];

const PADDING_LEN: usize = 65;
const COORDINATE_SCALE: f64 = 10_000_000.0;

const LATITUDE_OFFSET: usize = PACKET_HEADER.len();
const LONGITUDE_OFFSET: usize = LATITUDE_OFFSET + 4;
const DATE_OFFSET: usize = LONGITUDE_OFFSET + 4;
const UTC_OFFSET_OFFSET: usize = DATE_OFFSET + 7 + PADDING_LEN;
const DST_OFFSET_OFFSET: usize = UTC_OFFSET_OFFSET + 2;

#[derive(Debug, Error, PartialEq)]
pub enum EncodeError {
    #[error("latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),
    #[error("year {0} does not fit in 16 bits")]
    YearOutOfRange(i32),
    #[error("assembled packet is {0} bytes, expected 95")]
    PacketLength(usize),
}

/// Immutable 95-byte location payload for the telemetry characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationPacket([u8; PACKET_LEN]);

impl LocationPacket {
    pub fn from_fix(fix: &GeoFix) -> Result<Self, EncodeError> {
        encode_location(
            fix.latitude,
            fix.longitude,
            &fix.local_time,
            fix.utc_offset_minutes,
            fix.dst_offset_minutes,
        )
    }

    pub fn as_bytes(&self) -> &[u8; PACKET_LEN] {
        &self.0
    }

    /// Decoded (latitude, longitude) in degrees
    pub fn coordinates(&self) -> (f64, f64) {
        let latitude = i32::from_be_bytes(self.field(LATITUDE_OFFSET));
        let longitude = i32::from_be_bytes(self.field(LONGITUDE_OFFSET));
        (
            latitude as f64 / COORDINATE_SCALE,
            longitude as f64 / COORDINATE_SCALE,
        )
    }

    pub fn utc_offset_minutes(&self) -> i16 {
        i16::from_be_bytes(self.field(UTC_OFFSET_OFFSET))
    }

    pub fn dst_offset_minutes(&self) -> i16 {
        i16::from_be_bytes(self.field(DST_OFFSET_OFFSET))
    }

    fn field<const N: usize>(&self, offset: usize) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.0[offset..offset + N]);
        out
    }
}

impl AsRef<[u8]> for LocationPacket {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Encode a fix and the local clock into the camera's location packet
pub fn encode_location(
    latitude: f64,
    longitude: f64,
    local_time: &NaiveDateTime,
    utc_offset_minutes: i16,
    dst_offset_minutes: i16,
) -> Result<LocationPacket, EncodeError> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(EncodeError::LatitudeOutOfRange(latitude));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(EncodeError::LongitudeOutOfRange(longitude));
    }
    let year =
        i16::try_from(local_time.year()).map_err(|_| EncodeError::YearOutOfRange(local_time.year()))?;

    let mut bytes = Vec::with_capacity(PACKET_LEN);
    bytes.extend_from_slice(&PACKET_HEADER);

    // `as` truncates toward zero; the range checks above keep both in i32
    bytes.extend_from_slice(&((latitude * COORDINATE_SCALE) as i32).to_be_bytes());
    bytes.extend_from_slice(&((longitude * COORDINATE_SCALE) as i32).to_be_bytes());

    bytes.extend_from_slice(&year.to_be_bytes());
    bytes.extend_from_slice(&[
        local_time.month() as u8,
        local_time.day() as u8,
        local_time.hour() as u8,
        local_time.minute() as u8,
        local_time.second() as u8,
    ]);

    bytes.resize(bytes.len() + PADDING_LEN, 0);
    bytes.extend_from_slice(&utc_offset_minutes.to_be_bytes());
    bytes.extend_from_slice(&dst_offset_minutes.to_be_bytes());

    debug_assert_eq!(bytes.len(), PACKET_LEN);
    let packet: [u8; PACKET_LEN] = bytes
        .try_into()
        .map_err(|b: Vec<u8>| EncodeError::PacketLength(b.len()))?;

    Ok(LocationPacket(packet))
}
