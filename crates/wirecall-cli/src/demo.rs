//! Demo receiver served by `wirecall run`, and its client stub.

use wirecall::{trait_map, Binder, Operations, Proxy, Service, Stub, TraitMap};

/// Default reply of [`DemoServer::foo`].
pub const FOO_REPLY: &str = "you are a fool";

pub struct DemoServer;

impl DemoServer {
    fn echo(&self, msg: String) -> Result<(String,), String> {
        Ok((msg,))
    }

    fn add(&self, a: i64, b: i64) -> Result<(i64,), String> {
        a.checked_add(b)
            .map(|sum| (sum,))
            .ok_or_else(|| format!("{} + {} overflows", a, b))
    }

    fn foo(&self, key: String) -> Result<(Vec<Vec<Vec<String>>>,), String> {
        let reply = if key.is_empty() {
            FOO_REPLY.to_string()
        } else {
            format!("{}, {}", key, FOO_REPLY)
        };
        Ok((vec![vec![vec![reply]]],))
    }

    fn panic(&self) -> Result<(), String> {
        panic!("panic as expected");
    }

    fn error(&self) -> Result<(), String> {
        Err("error as expected".to_string())
    }
}

impl Service for DemoServer {
    fn trait_map(&self) -> TraitMap {
        trait_map! {
            "Echo" => ["msg"],
            "Add" => ["a", "b"],
            "Foo" => ["key"],
            "Panic" => [],
            "Error" => [],
        }
    }

    fn operations(ops: &mut Operations<Self>) {
        ops.add("Echo", DemoServer::echo)
            .add("Add", DemoServer::add)
            .add("Foo", DemoServer::foo)
            .add("Panic", DemoServer::panic)
            .add("Error", DemoServer::error);
    }
}

/// Typed proxies for every [`DemoServer`] operation.
#[allow(dead_code)]
pub struct DemoClient {
    pub echo: Proxy<(String,), (String,)>,
    pub add: Proxy<(i64, i64), (i64,)>,
    pub foo: Proxy<(String,), (Vec<Vec<Vec<String>>>,)>,
    pub panic: Proxy<(), ()>,
    pub error: Proxy<(), ()>,
}

impl Stub for DemoClient {
    fn bind(binder: &mut Binder<'_>) -> wirecall::Result<Self> {
        Ok(Self {
            echo: binder.proxy("Echo", &["msg"])?,
            add: binder.proxy("Add", &["a", "b"])?,
            foo: binder.proxy("Foo", &["key"])?,
            panic: binder.proxy("Panic", &[])?,
            error: binder.proxy("Error", &[])?,
        })
    }
}
