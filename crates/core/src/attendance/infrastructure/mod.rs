pub mod in_memory_record_store;
pub mod json_record_store;
