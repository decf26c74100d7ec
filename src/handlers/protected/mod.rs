// handlers/protected/mod.rs - Handlers behind the bearer token gate
//
// Route prefix: none; the gate is attached per route in server::router.
pub mod data; // Collection CRUD
pub mod sync; // Change feed pull/push
pub mod verify;

pub use verify::verify;
