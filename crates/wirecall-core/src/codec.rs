//! Positional value codecs for call arguments and call outputs.
//!
//! Arguments and outputs are tuples: `()` for none, `(T,)` for one,
//! `(A, B)` for two and so on up to six. Every element is encoded on its own
//! with serde, so any JSON-representable type can cross the wire.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::type_name;

/// Name used for the final error slot in endpoint descriptors.
pub const ERROR_TYPE_NAME: &str = "error";

/// A single slot that failed to encode or decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotError {
    pub index: usize,
    pub message: String,
}

impl SlotError {
    fn new(index: usize, err: impl std::fmt::Display) -> Self {
        Self {
            index,
            message: err.to_string(),
        }
    }
}

/// Client-side call arguments.
pub trait Arguments: Send + 'static {
    const COUNT: usize;

    fn type_names() -> Vec<String>;

    fn encode(self) -> Result<Vec<Value>, SlotError>;
}

/// Server-side handler outputs, encoded in declared order.
pub trait IntoOutputs: Send + 'static {
    const COUNT: usize;

    fn type_names() -> Vec<String>;

    fn encode(self) -> Result<Vec<Value>, SlotError>;
}

/// Client-side outputs, decoded positionally from a response's result list.
pub trait FromOutputs: Sized + Send + 'static {
    const COUNT: usize;

    fn type_names() -> Vec<String>;

    /// `values` holds the outputs only; the error slot is already stripped.
    fn decode(values: Vec<Value>) -> Result<Self, SlotError>;
}

macro_rules! impl_tuple_codecs {
    ($count:expr; $($ty:ident),*) => {
        impl<$($ty,)*> Arguments for ($($ty,)*)
        where
            $($ty: Serialize + Send + 'static,)*
        {
            const COUNT: usize = $count;

            fn type_names() -> Vec<String> {
                vec![$(type_name::<$ty>().to_string(),)*]
            }

            #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments)]
            fn encode(self) -> Result<Vec<Value>, SlotError> {
                let ($($ty,)*) = self;
                let mut values = Vec::with_capacity($count);
                let mut index = 0;
                $(
                    values.push(serde_json::to_value(&$ty).map_err(|e| SlotError::new(index, e))?);
                    index += 1;
                )*
                Ok(values)
            }
        }

        impl<$($ty,)*> IntoOutputs for ($($ty,)*)
        where
            $($ty: Serialize + Send + 'static,)*
        {
            const COUNT: usize = $count;

            fn type_names() -> Vec<String> {
                vec![$(type_name::<$ty>().to_string(),)*]
            }

            fn encode(self) -> Result<Vec<Value>, SlotError> {
                Arguments::encode(self)
            }
        }

        impl<$($ty,)*> FromOutputs for ($($ty,)*)
        where
            $($ty: DeserializeOwned + Send + 'static,)*
        {
            const COUNT: usize = $count;

            fn type_names() -> Vec<String> {
                vec![$(type_name::<$ty>().to_string(),)*]
            }

            #[allow(unused_mut, unused_variables)]
            fn decode(values: Vec<Value>) -> Result<Self, SlotError> {
                if values.len() != $count {
                    return Err(SlotError::new(
                        values.len().min($count),
                        format!("expected {} results, got {}", $count, values.len()),
                    ));
                }
                let mut slots = values.into_iter().enumerate();
                Ok(($(
                    {
                        let (index, value) = slots
                            .next()
                            .ok_or_else(|| SlotError::new($count, "result out of range"))?;
                        serde_json::from_value::<$ty>(value).map_err(|e| SlotError::new(index, e))?
                    },
                )*))
            }
        }
    };
}

impl_tuple_codecs!(0;);
impl_tuple_codecs!(1; T1);
impl_tuple_codecs!(2; T1, T2);
impl_tuple_codecs!(3; T1, T2, T3);
impl_tuple_codecs!(4; T1, T2, T3, T4);
impl_tuple_codecs!(5; T1, T2, T3, T4, T5);
impl_tuple_codecs!(6; T1, T2, T3, T4, T5, T6);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_arguments_encode_any_json_type() {
        let mut map = HashMap::new();
        map.insert("k".to_string(), vec![1, 2]);
        let values = Arguments::encode(("hi".to_string(), vec![vec!["a"]], map, 2.5_f64)).unwrap();
        assert_eq!(
            values,
            vec![json!("hi"), json!([["a"]]), json!({"k": [1, 2]}), json!(2.5)]
        );
    }

    #[test]
    fn test_unit_encodes_no_slots() {
        assert_eq!(<() as Arguments>::COUNT, 0);
        assert!(Arguments::encode(()).unwrap().is_empty());
        assert!(<() as FromOutputs>::decode(vec![]).is_ok());
    }

    #[test]
    fn test_outputs_decode_positionally() {
        let (n, s): (i64, String) =
            FromOutputs::decode(vec![json!(100), json!("abc")]).unwrap();
        assert_eq!(n, 100);
        assert_eq!(s, "abc");
    }

    #[test]
    fn test_outputs_decode_type_mismatch_reports_slot() {
        let err = <(i64, i64) as FromOutputs>::decode(vec![json!(1), json!("x")]).unwrap_err();
        assert_eq!(err.index, 1);
    }

    #[test]
    fn test_outputs_decode_wrong_length() {
        let err = <(i64,) as FromOutputs>::decode(vec![json!(1), json!(2)]).unwrap_err();
        assert!(err.message.contains("expected 1 results, got 2"));
        assert!(<(i64, i64) as FromOutputs>::decode(vec![json!(1)]).is_err());
    }

    #[test]
    fn test_type_names() {
        let names = <(i64, String) as IntoOutputs>::type_names();
        assert_eq!(names.len(), 2);
        assert_eq!(names[0], "i64");
        assert!(names[1].ends_with("String"));
    }
}
