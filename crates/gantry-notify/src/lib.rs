//! Job outcome notifications for the Gantry CI orchestrator.
//!
//! Finished jobs are announced to every sink configured for their
//! repository. Sinks are independent: one failing never affects another
//! or the job itself.

pub mod chat;
pub mod dispatcher;
pub mod error;
pub mod notifier;
pub mod pull_request;
pub mod slack;

pub use chat::ChatNotifier;
pub use dispatcher::{ConfiguredNotifiers, Dispatcher, NotifierFactory, SinkReport};
pub use error::NotifyError;
pub use notifier::{Notifier, Outcome};
pub use pull_request::PullRequestCommenter;
pub use slack::SlackNotifier;
