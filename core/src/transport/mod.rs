// Transport module: connection-layer seam for invite redemption

pub mod abstraction;
pub mod dial;
pub mod loopback;

pub use abstraction::{
    ConnectionEvent, ConnectionLayer, RpcSession, TransportError, TransportKind, UseRequest,
    UseResponse,
};
pub use dial::{dial, SingleFire};
pub use loopback::{LoopbackConnector, LoopbackNetwork, LoopbackSession};
