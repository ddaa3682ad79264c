pub mod cost;
pub mod outcome;
pub mod record;
