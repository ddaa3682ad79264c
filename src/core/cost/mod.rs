pub mod ledger;
pub mod pricing;
