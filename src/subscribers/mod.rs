//! # Event subscribers.
//!
//! Runtime events published on the [`Bus`](crate::events::Bus) are fanned out to
//! every [`Subscribe`] implementation through a [`SubscriberSet`].
//!
//! ```text
//!   Bus ──► Runtime listener ──► SubscriberSet::emit(&Event)
//!                                   ├──► LogWriter         (feature "logging")
//!                                   └──► custom ...
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
