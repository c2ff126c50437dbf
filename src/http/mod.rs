// HTTP execution boundary: transport trait, request/response types, and
// the refresh-then-retry execution core

mod executor;
mod reqwest_transport;
mod transport;

pub use executor::{classify_response, execute_with_auth, execute_stream_with_auth};
pub use reqwest_transport::ReqwestTransport;
pub use transport::{
    ByteStream, HttpRequest, HttpResponse, StreamingResponse, Transport, TransportError,
};
