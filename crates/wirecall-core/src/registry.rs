//! Server-side endpoint table.
//!
//! Receivers implement [`Service`]: they declare their trait map (endpoint
//! name to ordered parameter names) and the operations they expose. At
//! registration every operation becomes a boxed invoker that captures the
//! receiver, so dispatch never inspects types at call time.
//!
//! # Thread Safety
//!
//! The table sits behind a single `RwLock`. Validation runs before the lock
//! is taken; the lock is held only to check names and insert, or to clone an
//! [`Endpoint`] out for dispatch. Invocation always runs unlocked.

use crate::codec::ERROR_TYPE_NAME;
use crate::handler::{ArgDecoder, Handler};
use crate::{Result, WirecallError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Endpoint name to ordered parameter names.
pub type TraitMap = HashMap<String, Vec<String>>;

/// Build a [`TraitMap`] from literals.
///
/// ```
/// let traits = wirecall::trait_map! {
///     "Add" => ["a", "b"],
///     "Fail" => [],
/// };
/// assert_eq!(traits["Add"], vec!["a".to_string(), "b".to_string()]);
/// ```
#[macro_export]
macro_rules! trait_map {
    ($($name:expr => [$($param:expr),* $(,)?]),* $(,)?) => {{
        let mut traits = $crate::TraitMap::new();
        $(
            traits.insert(
                ::std::string::String::from($name),
                ::std::vec![$(::std::string::String::from($param)),*],
            );
        )*
        traits
    }};
}

/// A receiver whose operations can be registered as endpoints.
pub trait Service: Send + Sync + Sized + 'static {
    /// Declared parameter names of every exposed operation.
    fn trait_map(&self) -> TraitMap;

    /// Declare the exposed operations.
    fn operations(ops: &mut Operations<Self>);
}

type BoundFn<S> = Box<dyn Fn(&S, &mut ArgDecoder<'_>) -> Result<Vec<Value>> + Send + Sync>;

struct Operation<S> {
    name: String,
    arity: usize,
    arg_types: Vec<String>,
    return_types: Vec<String>,
    call: BoundFn<S>,
}

/// Collects the operations of a [`Service`].
pub struct Operations<S> {
    entries: Vec<Operation<S>>,
}

impl<S: Send + Sync + 'static> Operations<S> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Expose `handler` under `name`.
    ///
    /// The handler must return `Result<outputs, E>` with an
    /// [`ErrorCapable`](crate::ErrorCapable) `E`:
    ///
    /// ```
    /// use wirecall::{trait_map, Operations, Registry, Service, TraitMap};
    ///
    /// struct Counter;
    ///
    /// impl Counter {
    ///     fn get(&self) -> Result<(i64,), String> {
    ///         Ok((7,))
    ///     }
    /// }
    ///
    /// impl Service for Counter {
    ///     fn trait_map(&self) -> TraitMap {
    ///         trait_map! { "Get" => [] }
    ///     }
    ///
    ///     fn operations(ops: &mut Operations<Self>) {
    ///         ops.add("Get", Counter::get);
    ///     }
    /// }
    ///
    /// Registry::new().register(Counter).unwrap();
    /// ```
    ///
    /// An operation without an error slot cannot be registered:
    ///
    /// ```compile_fail
    /// use wirecall::{trait_map, Operations, Service, TraitMap};
    ///
    /// struct Counter;
    ///
    /// impl Counter {
    ///     fn get(&self) -> i64 {
    ///         7
    ///     }
    /// }
    ///
    /// impl Service for Counter {
    ///     fn trait_map(&self) -> TraitMap {
    ///         trait_map! { "Get" => [] }
    ///     }
    ///
    ///     fn operations(ops: &mut Operations<Self>) {
    ///         ops.add("Get", Counter::get);
    ///     }
    /// }
    /// ```
    ///
    /// Neither can one whose error carries no message:
    ///
    /// ```compile_fail
    /// use wirecall::{trait_map, Operations, Service, TraitMap};
    ///
    /// struct Opaque;
    /// struct Counter;
    ///
    /// impl Counter {
    ///     fn get(&self) -> Result<(i64,), Opaque> {
    ///         Err(Opaque)
    ///     }
    /// }
    ///
    /// impl Service for Counter {
    ///     fn trait_map(&self) -> TraitMap {
    ///         trait_map! { "Get" => [] }
    ///     }
    ///
    ///     fn operations(ops: &mut Operations<Self>) {
    ///         ops.add("Get", Counter::get);
    ///     }
    /// }
    /// ```
    pub fn add<H, A>(&mut self, name: &str, handler: H) -> &mut Self
    where
        H: Handler<S, A>,
    {
        self.entries.push(Operation {
            name: name.to_string(),
            arity: H::ARITY,
            arg_types: H::arg_types(),
            return_types: H::return_types(),
            call: Box::new(move |receiver: &S, args: &mut ArgDecoder<'_>| {
                handler.call(receiver, args)
            }),
        });
        self
    }
}

/// Discovery view of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub name: String,
    pub arg_names: Vec<String>,
    pub arg_types: Vec<String>,
    /// Output types followed by the final `error` slot.
    pub return_types: Vec<String>,
}

impl fmt::Display for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self
            .arg_names
            .iter()
            .enumerate()
            .map(|(i, name)| match self.arg_types.get(i) {
                Some(ty) => format!("{} {}", ty, name),
                None => name.clone(),
            })
            .collect();
        write!(
            f,
            "{}({}) => ({})",
            self.name,
            args.join(", "),
            self.return_types.join(", ")
        )
    }
}

impl EndpointDescriptor {
    /// Number of declared outputs, not counting the error slot.
    pub fn output_count(&self) -> usize {
        let has_error_slot = self.return_types.last().map(String::as_str) == Some(ERROR_TYPE_NAME);
        self.return_types.len() - usize::from(has_error_slot)
    }
}

type Invoker = Arc<dyn Fn(&mut ArgDecoder<'_>) -> Result<Vec<Value>> + Send + Sync>;

/// A registered endpoint. Cloning is cheap.
#[derive(Clone)]
pub struct Endpoint {
    descriptor: Arc<EndpointDescriptor>,
    invoker: Invoker,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl Endpoint {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn param_names(&self) -> &[String] {
        &self.descriptor.arg_names
    }

    pub fn descriptor(&self) -> &EndpointDescriptor {
        &self.descriptor
    }

    /// Decode `args`, call the operation and encode its outputs.
    ///
    /// Runs synchronously; panics are the caller's to recover.
    pub fn invoke(&self, args: Map<String, Value>) -> Result<Vec<Value>> {
        let declared = self.descriptor.arg_names.len();
        // The receiver occupies an implicit leading slot on both sides.
        if args.len() + 1 != declared + 1 {
            return Err(WirecallError::ArgumentCount {
                endpoint: self.descriptor.name.clone(),
                expected: declared,
                actual: args.len(),
            });
        }

        let mut decoder = ArgDecoder::new(&self.descriptor.name, &self.descriptor.arg_names, args);
        (self.invoker)(&mut decoder)
    }
}

/// Endpoint table keyed by name.
#[derive(Default)]
pub struct Registry {
    endpoints: RwLock<BTreeMap<String, Endpoint>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every operation `receiver` exposes.
    ///
    /// All operations are validated before anything is inserted, so a failed
    /// registration leaves the table untouched.
    pub fn register<S: Service>(&self, receiver: S) -> Result<()> {
        let traits = receiver.trait_map();
        let mut ops = Operations::new();
        S::operations(&mut ops);

        let receiver = Arc::new(receiver);
        let mut staged: Vec<Endpoint> = Vec::with_capacity(ops.entries.len());
        let mut seen = HashSet::new();

        for op in ops.entries {
            let params = validate_signature(&op.name, op.arity, &traits)?;
            if !seen.insert(op.name.clone()) {
                return Err(WirecallError::Duplicate { endpoint: op.name });
            }

            let bound = Arc::clone(&receiver);
            let call = op.call;
            staged.push(Endpoint {
                descriptor: Arc::new(EndpointDescriptor {
                    name: op.name,
                    arg_names: params,
                    arg_types: op.arg_types,
                    return_types: op.return_types,
                }),
                invoker: Arc::new(move |args: &mut ArgDecoder<'_>| call(&bound, args)),
            });
        }

        for name in traits.keys().filter(|name| !seen.contains(*name)) {
            warn!("Trait entry {} has no matching operation, ignoring", name);
        }

        let mut table = self
            .endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(taken) = staged.iter().find(|e| table.contains_key(e.name())) {
            return Err(WirecallError::Duplicate {
                endpoint: taken.name().to_string(),
            });
        }

        let count = staged.len();
        for endpoint in staged {
            debug!("Registered endpoint {}", endpoint.descriptor);
            table.insert(endpoint.name().to_string(), endpoint);
        }
        drop(table);

        info!(
            "Registered {} endpoint(s) from {}",
            count,
            std::any::type_name::<S>()
        );
        Ok(())
    }

    /// Clone out the endpoint registered under `name`.
    pub fn lookup(&self, name: &str) -> Option<Endpoint> {
        self.endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Descriptors of every endpoint, ordered by name.
    pub fn list(&self) -> Vec<EndpointDescriptor> {
        self.endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|e| e.descriptor().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Check an operation against its trait entry and return its parameter names.
fn validate_signature(name: &str, arity: usize, traits: &TraitMap) -> Result<Vec<String>> {
    let signature_error = |message: String| WirecallError::Signature {
        endpoint: name.to_string(),
        message,
    };

    if name.trim().is_empty() || name.contains('/') {
        return Err(signature_error(
            "endpoint name must be non-empty and must not contain '/'".to_string(),
        ));
    }

    let params = traits
        .get(name)
        .ok_or_else(|| signature_error("no trait entry declares its parameter names".to_string()))?;

    if params.len() != arity {
        return Err(signature_error(format!(
            "trait declares {} params but the operation takes {}",
            params.len(),
            arity
        )));
    }

    let mut unique = HashSet::new();
    if let Some(repeated) = params.iter().find(|p| !unique.insert(p.as_str())) {
        return Err(signature_error(format!("parameter {} declared twice", repeated)));
    }

    Ok(params.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Calculator;

    impl Calculator {
        fn add(&self, a: i64, b: i64) -> std::result::Result<(i64,), String> {
            Ok((a + b,))
        }

        fn larger(&self, a: i64, b: i64) -> std::result::Result<(bool,), String> {
            Ok((a < b,))
        }
    }

    impl Service for Calculator {
        fn trait_map(&self) -> TraitMap {
            trait_map! {
                "Add" => ["a", "b"],
                "Larger" => ["a", "b"],
            }
        }

        fn operations(ops: &mut Operations<Self>) {
            ops.add("Add", Calculator::add)
                .add("Larger", Calculator::larger);
        }
    }

    struct BadArity;

    impl Service for BadArity {
        fn trait_map(&self) -> TraitMap {
            trait_map! { "Sub" => ["a"] }
        }

        fn operations(ops: &mut Operations<Self>) {
            ops.add("Sub", |_: &BadArity, a: i64, b: i64| -> std::result::Result<(i64,), String> {
                Ok((a - b,))
            });
        }
    }

    struct Untraited;

    impl Service for Untraited {
        fn trait_map(&self) -> TraitMap {
            TraitMap::new()
        }

        fn operations(ops: &mut Operations<Self>) {
            ops.add("Ping", |_: &Untraited| -> std::result::Result<(), String> { Ok(()) });
        }
    }

    /// Declares "Add" plus a fresh endpoint, to collide with Calculator.
    struct Overlapping;

    impl Service for Overlapping {
        fn trait_map(&self) -> TraitMap {
            trait_map! { "Add" => ["x", "y"], "Mul" => ["x", "y"] }
        }

        fn operations(ops: &mut Operations<Self>) {
            ops.add("Mul", |_: &Overlapping, x: i64, y: i64| -> std::result::Result<(i64,), String> {
                Ok((x * y,))
            })
            .add("Add", |_: &Overlapping, x: i64, y: i64| -> std::result::Result<(i64,), String> {
                Ok((x + y + 1,))
            });
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_register_and_invoke() {
        let registry = Registry::new();
        registry.register(Calculator).unwrap();
        assert_eq!(registry.len(), 2);

        let endpoint = registry.lookup("Add").unwrap();
        assert_eq!(endpoint.param_names(), ["a".to_string(), "b".to_string()]);
        let result = endpoint.invoke(args(json!({"a": 2, "b": 3}))).unwrap();
        assert_eq!(result, vec![json!(5), Value::Null]);
    }

    #[test]
    fn test_lookup_unknown() {
        let registry = Registry::new();
        assert!(registry.lookup("Add").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let registry = Registry::new();
        registry.register(Calculator).unwrap();

        let err = registry.register(Overlapping).unwrap_err();
        assert!(matches!(err, WirecallError::Duplicate { ref endpoint } if endpoint == "Add"));
        assert!(err.is_registration());

        // Nothing from the failed receiver was inserted.
        assert!(registry.lookup("Mul").is_none());
        let result = registry
            .lookup("Add")
            .unwrap()
            .invoke(args(json!({"a": 1, "b": 1})))
            .unwrap();
        assert_eq!(result, vec![json!(2), Value::Null]);
    }

    #[test]
    fn test_signature_error_on_arity_mismatch() {
        let registry = Registry::new();
        let err = registry.register(BadArity).unwrap_err();
        assert!(matches!(err, WirecallError::Signature { ref endpoint, .. } if endpoint == "Sub"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_signature_error_without_trait_entry() {
        let registry = Registry::new();
        let err = registry.register(Untraited).unwrap_err();
        assert!(err.to_string().contains("no trait entry"));
    }

    #[test]
    fn test_argument_count_mismatch() {
        let registry = Registry::new();
        registry.register(Calculator).unwrap();
        let endpoint = registry.lookup("Add").unwrap();

        let err = endpoint
            .invoke(args(json!({"a": 1, "b": 2, "c": 3})))
            .unwrap_err();
        assert!(matches!(
            err,
            WirecallError::ArgumentCount { expected: 2, actual: 3, .. }
        ));
    }

    #[test]
    fn test_list_is_ordered_and_stable() {
        let registry = Registry::new();
        registry.register(Calculator).unwrap();

        let first = registry.list();
        let second = registry.list();
        assert_eq!(first, second);
        let names: Vec<&str> = first.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Add", "Larger"]);
        assert_eq!(first[0].arg_types, vec!["i64".to_string(), "i64".to_string()]);
        assert_eq!(first[0].return_types, vec!["i64".to_string(), "error".to_string()]);
        assert_eq!(first[0].output_count(), 1);
    }

    #[test]
    fn test_descriptor_display() {
        let registry = Registry::new();
        registry.register(Calculator).unwrap();
        let add = registry.lookup("Add").unwrap();
        assert_eq!(add.descriptor().to_string(), "Add(i64 a, i64 b) => (i64, error)");
    }

    #[test]
    fn test_trait_map_macro() {
        let traits = trait_map! { "Echo" => ["msg"], "Panic" => [] };
        assert_eq!(traits.len(), 2);
        assert!(traits["Panic"].is_empty());
    }
}
