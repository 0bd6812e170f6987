pub mod status_response;
pub mod toggle_response;
