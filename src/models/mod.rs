pub mod account;
pub mod order;
pub mod session;

pub use account::{Account, AccountSnapshot};
pub use order::PendingOrder;
pub use session::{ConversationState, Flow, UserSession};
