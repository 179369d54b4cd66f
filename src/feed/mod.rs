mod batch;
pub mod code;
mod flag;
mod gateway;
mod ids;
mod message;

pub use batch::ContactDelta;
pub use batch::ContactEmailDelta;
pub use batch::ConversationDelta;
pub use batch::CountEntry;
pub use batch::DeltaAction;
pub use batch::EventBatch;
pub use batch::LabelDelta;
pub use batch::LatestResponse;
pub use batch::MessageDelta;
pub use batch::Refresh;
pub use flag::Encryption;
pub use flag::MessageFlag;
pub use gateway::EventSource;
pub use gateway::FeedError;
pub use gateway::HttpGateway;
pub use gateway::MessageFetch;
pub use gateway::MessageSource;
pub use ids::AddressId;
pub use ids::ContactId;
pub use ids::EventId;
pub use ids::LabelId;
pub use ids::MessageId;
pub use message::Contact;
pub use message::ContactEmail;
pub use message::Conversation;
pub use message::Label;
pub use message::LabelKind;
pub use message::MessagePatch;
pub use message::RemoteAttachment;
pub use message::RemoteMessage;
pub use message::RemoteMessageBuilder;

#[cfg(test)]
pub(crate) mod testing;
