use crate::{Error, ErrorKind};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::type_name;

/// Converts typed values to and from the string payloads carried by the transport.
pub trait Codec: Send + Sync + 'static {
    /// Encodes a value into a payload.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> crate::Result<String>;

    /// Decodes a payload into a value.
    fn decode<T: DeserializeOwned>(&self, payload: &str) -> crate::Result<T>;
}

/// A [Codec] producing JSON payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> crate::Result<String> {
        serde_json::to_string(value).map_err(|err| {
            Error::new(
                ErrorKind::Serialization,
                format!("`{}`: {}", type_name::<T>(), err),
            )
        })
    }

    fn decode<T: DeserializeOwned>(&self, payload: &str) -> crate::Result<T> {
        serde_json::from_str(payload).map_err(|err| {
            Error::new(
                ErrorKind::Deserialization,
                format!("`{}`: {}", type_name::<T>(), err),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Inventory {
        owner: String,
        slots: BTreeMap<u8, Option<String>>,
        weight: f64,
    }

    #[test]
    fn round_trip_test() {
        let codec = JsonCodec;
        let inventory = Inventory {
            owner: "fish".to_owned(),
            slots: [(0, Some("rod".to_owned())), (1, None)].into_iter().collect(),
            weight: 12.5,
        };

        let payload = codec.encode(&inventory).unwrap();
        assert_eq!(inventory, codec.decode::<Inventory>(&payload).unwrap());

        let unit = codec.encode(&()).unwrap();
        codec.decode::<()>(&unit).unwrap();
    }

    #[test]
    fn decode_error_test() {
        let err = JsonCodec.decode::<Inventory>("{\"owner\": 3}").unwrap_err();
        assert_eq!(ErrorKind::Deserialization, err.kind());
        assert!(err.to_string().contains("Inventory"));
    }
}
