pub mod chain;
pub mod config;
pub mod context;
pub mod convert_0_10_0;
pub mod convert_0_10_1;
pub mod convert_0_10_2;
pub mod document;
pub mod legacy;
pub mod paths;
pub mod shapes;
pub mod tree;
pub mod util;
