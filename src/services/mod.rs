//! Service layer: session state machines and the operation verbs built on
//! top of them.

pub mod ccid_session;
pub mod device;
pub mod hid_session;
pub mod operations;
