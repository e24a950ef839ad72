pub mod observation;
pub mod record_store;
pub mod record_writer;
pub mod track_resolver;
pub mod vote_ledger;
