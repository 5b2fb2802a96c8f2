//! Domain types shared by every stage of a rollout.
//!
//! - [`task`]: `Task`, task-file loading
//! - [`message`]: `Role`, `Message`, `AuditEntry`
//! - [`conversation`]: `ConversationState`

pub mod conversation;
pub mod message;
pub mod task;

pub use conversation::ConversationState;
pub use message::{AuditEntry, Message, Role};
pub use task::{load_tasks, parse_task_lines, Task};
