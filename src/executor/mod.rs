mod runner;

pub use runner::{Console, Flow};
