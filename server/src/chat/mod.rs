pub mod delivery;
pub mod history;
pub mod messages;
pub mod presence;
pub mod store;

pub use delivery::{DeliveryOutcome, MessageRouter};
pub use history::HistoryService;
pub use presence::PresenceBroadcaster;
pub use store::{MessageStore, SqliteMessageStore};
