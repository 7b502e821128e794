pub mod attribution_link;
pub mod click_event;
pub mod fraud_flag;
pub mod link;
pub mod open_event;

pub use attribution_link::Entity as AttributionLinkEntity;
pub use click_event::Entity as ClickEventEntity;
pub use fraud_flag::Entity as FraudFlagEntity;
pub use link::Entity as LinkEntity;
pub use open_event::Entity as OpenEventEntity;
