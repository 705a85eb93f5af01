pub mod builders;

pub use builders::{send, AppBuilder, RequestBuilder, TEST_BODY};
