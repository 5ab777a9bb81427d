//! Typed marshalling for the variable protocol.
//!
//! Every variable read extracts one key from a JSON envelope and converts
//! it to a requested Rust type; every write serializes a Rust value to the
//! textual wire form the device accepts (`?value=<encoded>`). [`VarValue`]
//! centralizes both directions so that every configuration field shares one
//! failure contract instead of N bespoke parsers.
//!
//! Implementations exist for scalars, strings, homogeneous vectors
//! (comma-joined on the wire, e.g. thresholds `"10,25"`), raw
//! `serde_json::Value` passthrough (used for the structured `info`
//! variable), and each wire enum (generated by `wire_enum!`).

use serde_json::Value;

use crate::error::XspdError;

/// A value that can cross the variable protocol in both directions.
pub trait VarValue: Sized {
    /// Decode the JSON value found under the response key.
    ///
    /// `path` is the variable path, carried for error context only.
    fn decode(path: &str, value: &Value) -> Result<Self, XspdError>;

    /// Encode to the textual form used in a variable write.
    fn encode(&self) -> String;
}

macro_rules! scalar_var_value {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl VarValue for $ty {
                fn decode(path: &str, value: &Value) -> Result<Self, XspdError> {
                    serde_json::from_value(value.clone()).map_err(|_| XspdError::ValueShape {
                        path: path.to_string(),
                        expected: stringify!($ty),
                    })
                }

                fn encode(&self) -> String {
                    self.to_string()
                }
            }
        )+
    };
}

scalar_var_value!(i32, u32, i64, u64, f64);

impl VarValue for String {
    fn decode(path: &str, value: &Value) -> Result<Self, XspdError> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| XspdError::ValueShape {
                path: path.to_string(),
                expected: "string",
            })
    }

    fn encode(&self) -> String {
        self.clone()
    }
}

macro_rules! vector_var_value {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl VarValue for Vec<$ty> {
                fn decode(path: &str, value: &Value) -> Result<Self, XspdError> {
                    serde_json::from_value(value.clone()).map_err(|_| XspdError::ValueShape {
                        path: path.to_string(),
                        expected: concat!("array of ", stringify!($ty)),
                    })
                }

                fn encode(&self) -> String {
                    self.iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(",")
                }
            }
        )+
    };
}

vector_var_value!(f64, i32);

/// Passthrough for structured responses (`info` and friends).
impl VarValue for Value {
    fn decode(_path: &str, value: &Value) -> Result<Self, XspdError> {
        Ok(value.clone())
    }

    fn encode(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_scalar_int() {
        let v = i32::decode("status", &json!(1)).unwrap();
        assert_eq!(v, 1);
    }

    #[test]
    fn decode_scalar_wrong_shape() {
        let err = i32::decode("status", &json!("busy")).unwrap_err();
        assert!(matches!(err, XspdError::ValueShape { .. }));
    }

    #[test]
    fn decode_string() {
        let v = String::decode("message", &json!("success")).unwrap();
        assert_eq!(v, "success");
    }

    #[test]
    fn decode_string_rejects_number() {
        assert!(String::decode("message", &json!(3)).is_err());
    }

    #[test]
    fn decode_vector_of_doubles() {
        let v = Vec::<f64>::decode("values", &json!([1.1, 2.2, 3.3])).unwrap();
        assert_eq!(v, vec![1.1, 2.2, 3.3]);
    }

    #[test]
    fn decode_vector_of_ints() {
        let v = Vec::<i32>::decode("values", &json!([1, 2, 3, 4])).unwrap();
        assert_eq!(v, vec![1, 2, 3, 4]);
    }

    #[test]
    fn decode_empty_vector() {
        let v = Vec::<f64>::decode("thresholds", &json!([])).unwrap();
        assert!(v.is_empty());
    }

    #[test]
    fn encode_vector_is_comma_joined() {
        let v: Vec<f64> = vec![10.0, 25.0];
        assert_eq!(v.encode(), "10,25");
    }

    #[test]
    fn encode_scalar() {
        assert_eq!(42i32.encode(), "42");
        assert_eq!(12.5f64.encode(), "12.5");
    }
}
