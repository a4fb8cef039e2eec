//! usagewatch - poll an agent CLI's `/usage` screen and decide when to pause.

pub mod config;
pub mod monitor;
