//! Platform glue: async runtime helpers, token provider seams and environment-driven defaults.

pub mod environment;
pub mod runtime;
pub mod token;
