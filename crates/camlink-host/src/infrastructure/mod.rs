//! Host infrastructure: the port-forwarding seam, the cross-process port
//! arbiter, and the blocking TCP control channel.

pub mod channel;
pub mod forwarder;
pub mod port_arbiter;
