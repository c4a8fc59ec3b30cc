pub mod bus;
pub mod frame;
pub mod transport;

pub use bus::{EventBus, Subscription};
pub use frame::{Frame, GatewayError};
pub use transport::{MemoryTransport, PushTransport};
