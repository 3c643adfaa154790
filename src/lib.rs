pub mod addr;
pub mod capture;
pub mod engine;
pub mod net;
pub mod proto;
pub mod services;
pub mod sim;
pub mod stp;
pub mod topo;

#[cfg(test)]
mod test;
