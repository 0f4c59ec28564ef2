//! Delivery-side surfaces: the execution ledger, the campaign store, the
//! A/B counter recorder, and the batch runner that drives them.

pub mod ledger;
pub mod recorder;
pub mod runner;
pub mod store;

pub use ledger::ExecutionLedger;
pub use recorder::AbTestRecorder;
pub use runner::DeliveryRunner;
pub use store::CampaignStore;
