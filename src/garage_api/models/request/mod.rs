pub mod toggle_request;
