pub mod extractor;
pub mod ledger;
pub mod marketplace;
pub mod notifier;
pub mod pipeline;
pub mod poller;
pub mod router;
