pub mod retry;

pub use retry::{Retryable, with_retry};
