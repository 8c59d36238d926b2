pub mod envelopes;
pub mod stream_client;
pub mod subjects;
