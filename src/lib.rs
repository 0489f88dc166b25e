pub mod app;
pub mod net;
pub mod proto;
pub mod sim;
pub mod topo;

#[cfg(test)]
mod test;
