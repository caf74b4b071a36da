//! Multiplexed binary RPC transport.

pub mod codec;
pub mod connection;
pub mod handle;
pub mod protocol;
pub mod services;

pub use codec::{read_frame, write_frame, CodecError, FrameHeader, MAGIC, VERSION};
pub use connection::RpcConnection;
pub use handle::ConnectionHandle;
pub use protocol::{FrameBody, RpcFrame, RpcRequest, RpcResponse};
pub use services::{
    AuthenticationService, Reply, RoomService, RoutingService, SessionModules, TopicsService,
};
