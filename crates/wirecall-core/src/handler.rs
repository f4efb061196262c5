//! Typed handler adapters.
//!
//! Any `Fn(&R, A1, .., An) -> Result<O, E>` with up to six arguments is a
//! [`Handler`] when every argument is deserializable with a zero value, the
//! outputs `O` are an [`IntoOutputs`] tuple and the error `E` is
//! [`ErrorCapable`]. The bounds are the registration-time signature check:
//! a function whose final slot cannot report a failure message does not
//! implement `Handler` and cannot be registered.

use crate::bridge::{handler_failure, ErrorCapable};
use crate::codec::{IntoOutputs, ERROR_TYPE_NAME};
use crate::{Result, WirecallError};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::any::type_name;

/// Decodes a request's named arguments in declared parameter order.
pub struct ArgDecoder<'a> {
    endpoint: &'a str,
    names: &'a [String],
    args: Map<String, Value>,
    next: usize,
}

impl<'a> ArgDecoder<'a> {
    pub fn new(endpoint: &'a str, names: &'a [String], args: Map<String, Value>) -> Self {
        Self {
            endpoint,
            names,
            args,
            next: 0,
        }
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint
    }

    /// Decode the next declared parameter.
    ///
    /// An absent key is an error; an explicit `null` yields the zero value.
    pub fn decode<T>(&mut self) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let name = self
            .names
            .get(self.next)
            .ok_or_else(|| WirecallError::ArgumentCount {
                endpoint: self.endpoint.to_string(),
                expected: self.names.len(),
                actual: self.next + 1,
            })?;
        self.next += 1;

        match self.args.remove(name) {
            None => Err(WirecallError::MissingArgument {
                argument: name.clone(),
            }),
            Some(Value::Null) => Ok(T::default()),
            Some(raw) => serde_json::from_value(raw).map_err(|e| WirecallError::ArgumentDecode {
                argument: name.clone(),
                message: e.to_string(),
            }),
        }
    }
}

/// A function that can be bound to a receiver of type `R` as an endpoint.
///
/// `Args` is the tuple of parameter types; it only exists to keep the impls
/// for different arities apart.
pub trait Handler<R, Args>: Send + Sync + 'static {
    /// Number of declared parameters, not counting the receiver.
    const ARITY: usize;

    fn arg_types() -> Vec<String>;

    /// Output type names followed by the error slot.
    fn return_types() -> Vec<String>;

    /// Decode arguments, invoke, and encode every output followed by the
    /// `null` error slot.
    fn call(&self, receiver: &R, args: &mut ArgDecoder<'_>) -> Result<Vec<Value>>;
}

fn encode_outputs<O: IntoOutputs>(endpoint: &str, outputs: O) -> Result<Vec<Value>> {
    let mut values = outputs
        .encode()
        .map_err(|slot| WirecallError::ResultEncode {
            endpoint: endpoint.to_string(),
            index: slot.index,
            message: slot.message,
        })?;
    values.push(Value::Null);
    Ok(values)
}

fn return_types_of<O: IntoOutputs>() -> Vec<String> {
    let mut names = O::type_names();
    names.push(ERROR_TYPE_NAME.to_string());
    names
}

macro_rules! impl_handler {
    ($arity:expr; $($ty:ident),*) => {
        impl<R, F, O, E, $($ty,)*> Handler<R, ($($ty,)*)> for F
        where
            R: Send + Sync + 'static,
            F: Fn(&R, $($ty,)*) -> std::result::Result<O, E> + Send + Sync + 'static,
            O: IntoOutputs,
            E: ErrorCapable,
            $($ty: DeserializeOwned + Default + 'static,)*
        {
            const ARITY: usize = $arity;

            fn arg_types() -> Vec<String> {
                vec![$(type_name::<$ty>().to_string(),)*]
            }

            fn return_types() -> Vec<String> {
                return_types_of::<O>()
            }

            #[allow(non_snake_case, unused_variables)]
            fn call(&self, receiver: &R, args: &mut ArgDecoder<'_>) -> Result<Vec<Value>> {
                $(let $ty = args.decode::<$ty>()?;)*
                match (self)(receiver, $($ty,)*) {
                    Ok(outputs) => encode_outputs(args.endpoint(), outputs),
                    Err(err) => Err(handler_failure(err)),
                }
            }
        }
    };
}

impl_handler!(0;);
impl_handler!(1; A1);
impl_handler!(2; A1, A2);
impl_handler!(3; A1, A2, A3);
impl_handler!(4; A1, A2, A3, A4);
impl_handler!(5; A1, A2, A3, A4, A5);
impl_handler!(6; A1, A2, A3, A4, A5, A6);
