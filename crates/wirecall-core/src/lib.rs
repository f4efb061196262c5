//! Wirecall - expose an object's operations as JSON-over-HTTP endpoints.
//!
//! A receiver type implements [`Service`] to declare which of its methods are
//! public operations. A [`Server`] registers receivers and serves each
//! operation at `POST <base>/<Name>`. A [`Client`] binds [`Stub`]s, structs of
//! typed [`Proxy`] values, and every proxy call becomes one HTTP request.
//!
//! Every operation reports failure through its final slot: the server writes
//! it as `null` on success, and the client returns it as the `Err` side of
//! the call result.
//!
//! # Example
//!
//! ```rust,no_run
//! use wirecall::{trait_map, Binder, Client, Operations, Proxy, Server, Service, Stub, TraitMap};
//!
//! struct Calculator;
//!
//! impl Calculator {
//!     fn add(&self, a: i64, b: i64) -> Result<(i64,), String> {
//!         Ok((a + b,))
//!     }
//! }
//!
//! impl Service for Calculator {
//!     fn trait_map(&self) -> TraitMap {
//!         trait_map! { "Add" => ["a", "b"] }
//!     }
//!
//!     fn operations(ops: &mut Operations<Self>) {
//!         ops.add("Add", Calculator::add);
//!     }
//! }
//!
//! struct CalculatorStub {
//!     add: Proxy<(i64, i64), (i64,)>,
//! }
//!
//! impl Stub for CalculatorStub {
//!     fn bind(binder: &mut Binder<'_>) -> wirecall::Result<Self> {
//!         Ok(Self { add: binder.proxy("Add", &["a", "b"])? })
//!     }
//! }
//!
//! # async fn example() -> wirecall::Result<()> {
//! let server = Server::new()?;
//! server.register(Calculator)?;
//! let handle = server.bind("127.0.0.1", 0, "/").await?;
//!
//! let client = Client::new(&handle.authority())?;
//! let calc: CalculatorStub = client.reg()?;
//! let (sum,) = calc.add.call((2, 3)).await?;
//! assert_eq!(sum, 5);
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod builtin;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod registry;
pub mod server;

pub use bridge::ErrorCapable;
pub use builtin::{Uptime, LIST_ENDPOINT, UPTIME_ENDPOINT};
pub use client::{Binder, Client, Proxy, Stub};
pub use codec::{Arguments, FromOutputs, IntoOutputs};
pub use config::{ClientConfig, RpcConfig};
pub use error::{Result, WirecallError};
pub use handler::{ArgDecoder, Handler};
pub use protocol::{CallDescriptor, RequestEnvelope, ResponseEnvelope, Status};
pub use registry::{Endpoint, EndpointDescriptor, Operations, Registry, Service, TraitMap};
pub use server::{Server, ServerHandle};
