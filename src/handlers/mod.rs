// handlers/mod.rs - Two handler tiers
//
// Public (no auth) → Protected (bearer token via middleware::auth)
pub mod public;
pub mod protected;
