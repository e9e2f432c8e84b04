pub mod message;
pub mod order;

pub use message::{AgentTag, DecisionMemory, GuardVerdict, Message, Role, UnknownAgentTag};
pub use order::{OrderLine, OrderSnapshot};
