mod chat_service;
mod message_history;
mod participant_service;

pub use chat_service::{ChatService, ChatServiceDependencies, SendOutcome};
pub use message_history::{MessageHistory, MessageHistoryDependencies};
pub use participant_service::{ParticipantService, ParticipantServiceDependencies};
