// Standing subscriptions started by the strategy at store creation.
pub(crate) mod cookie_probe;
pub(crate) mod current_user;
pub(crate) mod storage_events;
pub(crate) mod studio_source;
pub(crate) mod token_refresh;
