pub mod clock;
pub mod constants;
pub mod panic;
pub mod retry;
pub mod types;
pub mod validation;

#[cfg(test)]
pub mod test_helpers;
