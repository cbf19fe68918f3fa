pub mod cli;
pub mod id;
pub mod random;
