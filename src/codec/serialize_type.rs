use crate::codec::CodecError;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::de::value::{Error as ValueError, SeqDeserializer, UnitDeserializer};
use serde::de::{DeserializeOwned, IntoDeserializer};
use serde::Serialize;
use serde_json::Value;

/// Payload serializer tag carried on the wire.
///
/// - `Raw` passes byte sequences through untouched (`Vec<u8>`, `[u8; N]`, `()`).
/// - `Json` uses `serde_json`.
/// - `Bitcode` uses the compact binary `bitcode` format and is the default.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum SerializeType {
    Raw = 0,
    Json = 1,
    #[default]
    Bitcode = 2,
}

impl SerializeType {
    /// All serializers built into this crate.
    pub const ALL: [SerializeType; 3] = [
        SerializeType::Raw,
        SerializeType::Json,
        SerializeType::Bitcode,
    ];

    pub fn encode<T>(self, value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: Serialize + ?Sized,
    {
        match self {
            SerializeType::Raw => encode_raw(value),
            SerializeType::Json => {
                serde_json::to_vec(value).map_err(|e| CodecError::Serialize(e.to_string()))
            }
            SerializeType::Bitcode => {
                bitcode::serialize(value).map_err(|e| CodecError::Serialize(e.to_string()))
            }
        }
    }

    /// Decodes `bytes` into `T`.
    ///
    /// An empty payload which the format itself rejects is retried as a unit
    /// value, so replies like `()` or `Option::None` survive a response that
    /// carried no data.
    pub fn decode<T>(self, bytes: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        let decoded = match self {
            SerializeType::Raw => {
                T::deserialize(SeqDeserializer::<_, ValueError>::new(bytes.iter().copied()))
                    .map_err(|e| CodecError::Deserialize(e.to_string()))
            }
            SerializeType::Json => {
                serde_json::from_slice(bytes).map_err(|e| CodecError::Deserialize(e.to_string()))
            }
            SerializeType::Bitcode => {
                bitcode::deserialize(bytes).map_err(|e| CodecError::Deserialize(e.to_string()))
            }
        };

        match decoded {
            Err(err) if bytes.is_empty() => {
                let unit: UnitDeserializer<ValueError> = ().into_deserializer();
                T::deserialize(unit).map_err(|_| err)
            }
            other => other,
        }
    }
}

fn encode_raw<T>(value: &T) -> Result<Vec<u8>, CodecError>
where
    T: Serialize + ?Sized,
{
    let not_bytes = || CodecError::Serialize("raw payloads must be byte sequences".to_string());

    match serde_json::to_value(value).map_err(|e| CodecError::Serialize(e.to_string()))? {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|byte| u8::try_from(byte).ok())
                    .ok_or_else(not_bytes)
            })
            .collect(),
        _ => Err(not_bytes()),
    }
}
