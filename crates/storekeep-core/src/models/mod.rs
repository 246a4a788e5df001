pub mod attribute;
pub mod catalog;
pub mod error;
pub mod platform;
pub mod store;
pub mod user;

pub use attribute::{Attribute, AttributeChanges, AttributeScope, AttributeValue};
pub use catalog::{
    App, AppInfoLocalization, AppSnapshot, AppVersion, AppVersionLocalization, Screenshot,
};
pub use error::{CoreError, CoreErrorKind, SyncScope};
pub use platform::Platform;
pub use store::{NewStore, Store, StoreCredentials, StoreId};
pub use user::{User, UserId};
