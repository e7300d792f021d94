mod apps;
mod calls;
mod commands;
mod literals;
mod types;

pub use apps::{parse_app_name, read_app_name};
pub use calls::match_call;
pub use commands::{code_words, is_comment, is_control_transfer, strip_comment, CONTROL_TRANSFERS};
pub use literals::{parse_number, parse_word};
pub use types::CallSite;
