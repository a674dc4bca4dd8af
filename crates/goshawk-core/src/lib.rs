pub mod event;
pub mod pdk;
pub mod policy;
