//! Per-flag value decoders.
//!
//! Every `VALUE` reply carries a 32-bit flags field. Clients use it to tag
//! how the data block was serialized; the registry maps each tag to the
//! decoder that turns the raw text back into a value.

use crate::error::{DecodeFailure, ValidationError};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A decoder from raw payload text to a value.
pub type Decoder = Arc<dyn Fn(&str) -> Result<Value, DecodeFailure> + Send + Sync>;

/// Conversion of caller-supplied ids into a validated flag id.
///
/// Implemented for the integer types, floats (which must be integral) and
/// text (which must parse as an unsigned 32-bit integer).
pub trait FlagId {
    fn to_flag_id(&self) -> Result<u32, ValidationError>;
}

macro_rules! impl_flag_id_for_int {
    ($($t:ty),*) => {
        $(
            impl FlagId for $t {
                fn to_flag_id(&self) -> Result<u32, ValidationError> {
                    u32::try_from(*self)
                        .map_err(|_| ValidationError::FlagOutOfRange(self.to_string()))
                }
            }
        )*
    };
}

impl_flag_id_for_int!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

impl FlagId for f64 {
    fn to_flag_id(&self) -> Result<u32, ValidationError> {
        if self.is_finite() && self.fract() == 0.0 && *self >= 0.0 && *self <= u32::MAX as f64 {
            Ok(*self as u32)
        } else {
            Err(ValidationError::FlagOutOfRange(self.to_string()))
        }
    }
}

impl FlagId for f32 {
    fn to_flag_id(&self) -> Result<u32, ValidationError> {
        f64::from(*self).to_flag_id()
    }
}

impl FlagId for str {
    fn to_flag_id(&self) -> Result<u32, ValidationError> {
        self.trim()
            .parse::<u32>()
            .map_err(|_| ValidationError::FlagOutOfRange(format!("{:?}", self)))
    }
}

impl FlagId for String {
    fn to_flag_id(&self) -> Result<u32, ValidationError> {
        self.as_str().to_flag_id()
    }
}

impl<T: FlagId + ?Sized> FlagId for &T {
    fn to_flag_id(&self) -> Result<u32, ValidationError> {
        (**self).to_flag_id()
    }
}

/// Mapping from flag id to decoder.
#[derive(Clone)]
pub struct FlagRegistry {
    decoders: HashMap<u32, Decoder>,
    identity: Decoder,
}

impl FlagRegistry {
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
            identity: Arc::new(decoders::string),
        }
    }

    /// Registers `decoder` for `id`, replacing any previous decoder.
    pub fn register<I, F>(&mut self, id: I, decoder: F) -> Result<(), ValidationError>
    where
        I: FlagId,
        F: Fn(&str) -> Result<Value, DecodeFailure> + Send + Sync + 'static,
    {
        self.register_decoder(id, Arc::new(decoder))
    }

    /// Registers an already shared decoder.
    pub fn register_decoder<I: FlagId>(
        &mut self,
        id: I,
        decoder: Decoder,
    ) -> Result<(), ValidationError> {
        let id = id.to_flag_id()?;
        if self.decoders.insert(id, decoder).is_some() {
            tracing::debug!("Replaced decoder for flag {}", id);
        }
        Ok(())
    }

    /// Registers one of the built-in decoders by name.
    ///
    /// The id is validated before the name.
    pub fn register_named<I: FlagId>(&mut self, id: I, name: &str) -> Result<(), ValidationError> {
        let id = id.to_flag_id()?;
        let decoder = decoders::by_name(name)
            .ok_or_else(|| ValidationError::NotADecoder(name.to_string()))?;
        self.register_decoder(id, decoder)
    }

    /// Returns the decoder for `id`, or the identity decoder.
    pub fn resolve(&self, id: u32) -> &Decoder {
        self.decoders.get(&id).unwrap_or(&self.identity)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.decoders.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Copies every entry of `other` into this registry.
    pub fn merge(&mut self, other: &FlagRegistry) {
        for (id, decoder) in &other.decoders {
            self.decoders.insert(*id, Arc::clone(decoder));
        }
    }
}

impl Default for FlagRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FlagRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.decoders.keys().collect();
        ids.sort();
        f.debug_struct("FlagRegistry").field("ids", &ids).finish()
    }
}

/// Built-in decoders.
pub mod decoders {
    use super::*;

    /// Returns the payload unchanged, as a string value.
    pub fn string(raw: &str) -> Result<Value, DecodeFailure> {
        Ok(Value::String(raw.to_string()))
    }

    /// Parses the payload as a number: integers first, then finite floats.
    pub fn number(raw: &str) -> Result<Value, DecodeFailure> {
        let raw = raw.trim();
        if let Ok(n) = raw.parse::<i64>() {
            return Ok(Value::from(n));
        }
        if let Ok(n) = raw.parse::<u64>() {
            return Ok(Value::from(n));
        }
        raw.parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("{:?} is not a number", raw).into())
    }

    /// Parses the payload as JSON.
    pub fn json(raw: &str) -> Result<Value, DecodeFailure> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Looks up a built-in decoder by its exact name.
    pub fn by_name(name: &str) -> Option<Decoder> {
        match name {
            "string" => Some(Arc::new(string)),
            "number" => Some(Arc::new(number)),
            "json" => Some(Arc::new(json)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &str) -> Result<Value, DecodeFailure> {
        Ok(Value::Null)
    }

    #[test]
    fn test_flag_id_boundaries() {
        let mut registry = FlagRegistry::new();
        assert!(registry.register(0, noop).is_ok());
        assert!(registry.register(4294967295u64, noop).is_ok());
        assert!(registry.register(2, noop).is_ok());

        assert!(registry.register(-1, noop).unwrap_err().is_range());
        assert!(registry.register("-1", noop).unwrap_err().is_range());
        assert!(registry.register(4294967296u64, noop).unwrap_err().is_range());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_flag_id_from_float_and_text() {
        assert_eq!(7.0f64.to_flag_id().unwrap(), 7);
        assert!(7.5f64.to_flag_id().unwrap_err().is_range());
        assert!(f64::NAN.to_flag_id().is_err());
        assert!((-1.0f64).to_flag_id().is_err());
        assert!(4294967296.0f64.to_flag_id().is_err());

        assert_eq!("42".to_flag_id().unwrap(), 42);
        assert_eq!(String::from("109").to_flag_id().unwrap(), 109);
        assert!("abc".to_flag_id().is_err());
        assert!("1.5".to_flag_id().is_err());
    }

    #[test]
    fn test_out_of_range_message() {
        let err = 4294967296i64.to_flag_id().unwrap_err();
        assert!(err.to_string().contains("unsigned"));
    }

    #[test]
    fn test_unknown_named_decoder() {
        let mut registry = FlagRegistry::new();
        let err = registry.register_named(1, "1").unwrap_err();
        assert!(err.is_type());
        assert!(err.to_string().contains("function"));
        assert!(registry.is_empty());

        // Id is validated first
        let err = registry.register_named(-1, "json").unwrap_err();
        assert!(err.is_range());

        registry.register_named(1, "json").unwrap();
        assert!(registry.contains(1));
    }

    #[test]
    fn test_decoder_names_are_exact() {
        for name in ["string", "number", "json"] {
            assert!(decoders::by_name(name).is_some(), "{}", name);
        }
        for name in ["JSON", "Number", "raw", " json", ""] {
            assert!(decoders::by_name(name).is_none(), "{}", name);
        }
    }

    #[test]
    fn test_resolve_defaults_to_identity() {
        let registry = FlagRegistry::new();
        let value = (registry.resolve(99))("hello").unwrap();
        assert_eq!(value, Value::String("hello".to_string()));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = FlagRegistry::new();
        registry.register(1, |_: &str| Ok(Value::from(1))).unwrap();
        registry.register(1, |_: &str| Ok(Value::from(2))).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!((registry.resolve(1))("").unwrap(), Value::from(2));
    }

    #[test]
    fn test_merge() {
        let mut initial = FlagRegistry::new();
        initial.register_named(109, "number").unwrap();
        initial.register_named(110, "json").unwrap();

        let mut registry = FlagRegistry::new();
        registry.register_named(1, "string").unwrap();
        registry.merge(&initial);

        assert_eq!(registry.len(), 3);
        assert!(registry.contains(109));
        assert!(registry.contains(110));
    }

    #[test]
    fn test_number_decoder() {
        assert_eq!(decoders::number("1").unwrap(), Value::from(1));
        assert_eq!(decoders::number(" 42 ").unwrap(), Value::from(42));
        assert_eq!(decoders::number("-3").unwrap(), Value::from(-3));
        assert_eq!(decoders::number("1.5").unwrap(), Value::from(1.5));
        assert_eq!(
            decoders::number("18446744073709551615").unwrap(),
            Value::from(u64::MAX)
        );
        assert!(decoders::number("abc").is_err());
        assert!(decoders::number("NaN").is_err());
    }

    #[test]
    fn test_json_decoder() {
        let value = decoders::json(r#"{"foo":"bar","bar":121313}"#).unwrap();
        assert_eq!(value["foo"], "bar");
        assert_eq!(value["bar"], 121313);

        assert!(decoders::json("{not json").is_err());
    }

    #[test]
    fn test_debug_lists_ids() {
        let mut registry = FlagRegistry::new();
        registry.register_named(2, "json").unwrap();
        registry.register_named(1, "number").unwrap();
        assert_eq!(format!("{:?}", registry), "FlagRegistry { ids: [1, 2] }");
    }
}
