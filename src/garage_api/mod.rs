pub mod backoff;
pub mod event_stream;
pub mod garage_client;
pub mod models;

#[cfg(test)]
pub(crate) mod test_server;
