//! Tower layers of the default client stack.

mod user_agent;

pub use user_agent::{UserAgentLayer, UserAgentService};
