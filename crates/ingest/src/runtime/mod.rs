//! Runtime module - process lifecycle: boot, input pump, shutdown.

pub mod boot;
pub mod pump;
pub mod stop;
