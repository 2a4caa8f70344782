//! Session authentication stub.

use crate::http::request::RequestDescriptor;
use crate::http::response::ResponseDescriptor;
use crate::translate::AUTH_SUCCESS_TOKEN;

/// Always report a successful authentication, whatever the request says.
pub fn handle(_req: &RequestDescriptor) -> ResponseDescriptor {
    ResponseDescriptor::ok("text/plain", AUTH_SUCCESS_TOKEN)
}
