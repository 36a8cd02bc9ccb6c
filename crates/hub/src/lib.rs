pub mod chat;
pub mod frames;
pub mod registry;

pub use frames::{parse_client_frame, ClientFrame, ServerFrame};
pub use registry::{new_connection_channel, Hub, Outbound, Registration, CONNECTION_BUFFER_CAPACITY};
