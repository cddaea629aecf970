pub mod budget;
pub mod currency;
pub mod distribution;
pub mod optimizer;
