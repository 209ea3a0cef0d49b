pub mod response;

pub use response::{parse_body, ApiResult, Endpoint};
