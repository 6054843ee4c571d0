//! HTTP boundary layer: routes, response types, server lifecycle

mod response;
mod router;
mod server;

pub use response::{ApiError, ApiResponse, JSONAPI_VERSION, json_api_envelope, page_not_found};
pub use router::{AppState, create_router};
pub use server::Server;
