//! Realtime channel (Socket.IO over WebSocket)

pub mod events;
pub mod packet;
pub mod socket;
