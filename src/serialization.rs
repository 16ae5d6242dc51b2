/// Serialization format options for grid snapshots.
///
/// Both formats encode with bincode; the Lz4 variant compresses the result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SerializationFormat {
    /// Bincode format - compact binary, no compression
    Bincode,
    /// Bincode format with LZ4 compression (default, cell data compresses well)
    #[default]
    BincodeLz4,
}

impl SerializationFormat {
    /// Returns true if this format uses LZ4 compression
    pub fn is_compressed(&self) -> bool {
        matches!(self, SerializationFormat::BincodeLz4)
    }
}

use crate::errors::HCError;
use serde::{de::DeserializeOwned, Serialize};

fn serialize_bincode<T: Serialize>(data: &T) -> Result<Vec<u8>, HCError> {
    bincode::serde::encode_to_vec(data, bincode::config::standard()).map_err(|_| HCError::SerializationFailed)
}

fn deserialize_bincode<T: DeserializeOwned>(data: &[u8]) -> Result<T, HCError> {
    bincode::serde::decode_from_slice(data, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|_| HCError::DeserializationFailed)
}

/// Serialize data to bytes using the specified format.
/// Applies LZ4 compression if the format variant ends with Lz4.
pub fn serialize<T: Serialize>(data: &T, format: SerializationFormat) -> Result<Vec<u8>, HCError> {
    let bytes = serialize_bincode(data)?;
    if format.is_compressed() {
        Ok(lz4_flex::compress_prepend_size(&bytes))
    } else {
        Ok(bytes)
    }
}

/// Deserialize data from bytes using the specified format.
/// Applies LZ4 decompression if the format variant ends with Lz4.
pub fn deserialize<T: DeserializeOwned>(data: &[u8], format: SerializationFormat) -> Result<T, HCError> {
    if format.is_compressed() {
        let decompressed = lz4_flex::decompress_size_prepended(data)
            .map_err(|_| HCError::LZ4DecompressionFailed)?;
        deserialize_bincode(&decompressed)
    } else {
        deserialize_bincode(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
    struct TestData {
        states: Vec<u32>,
        values: Vec<f64>,
    }

    #[test]
    fn test_bincode_roundtrip() {
        let data = TestData {
            states: vec![0, 1 << 11, 3],
            values: vec![1.0, 2.0, 3.0],
        };

        let bytes = serialize(&data, SerializationFormat::Bincode).unwrap();
        let result: TestData = deserialize(&bytes, SerializationFormat::Bincode).unwrap();
        assert_eq!(data, result);
    }

    #[test]
    fn test_bincode_lz4_roundtrip() {
        let data = TestData {
            states: vec![0; 64],
            values: vec![0.5; 256],
        };

        let bytes = serialize(&data, SerializationFormat::BincodeLz4).unwrap();
        assert!(bytes.len() < serialize(&data, SerializationFormat::Bincode).unwrap().len());
        let result: TestData = deserialize(&bytes, SerializationFormat::BincodeLz4).unwrap();
        assert_eq!(data, result);
    }

    #[test]
    fn test_corrupt_input() {
        let result: Result<TestData, _> = deserialize(&[1, 2, 3], SerializationFormat::BincodeLz4);
        assert_eq!(result, Err(HCError::LZ4DecompressionFailed));
        let result: Result<TestData, _> = deserialize(&[0xff; 3], SerializationFormat::Bincode);
        assert_eq!(result, Err(HCError::DeserializationFailed));
    }
}
