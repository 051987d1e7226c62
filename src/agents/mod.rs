// Claude agent process spawning and monitoring

pub mod manager;
pub mod path_resolver;
pub mod runner;
pub mod stream_parser;

// Re-export for convenience
pub use manager::{
    AgentManager, AgentManagerError, AgentStatusInfo, ResourceStatus, SendMessageResult,
};
pub use runner::{
    AgentRunOutput, AgentRunRequest, AgentRunner, CancelHandle, ClaudeCliRunner, EventCallback,
};
pub use stream_parser::{collect_text, parse_line, StreamEvent};
