pub mod chunk_writer;
pub mod completion;
pub mod file_store;
pub mod upload_service;
pub mod worker;
pub mod workspace;
