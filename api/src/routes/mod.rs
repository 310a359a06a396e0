pub mod auth;
pub mod compositions;
pub mod health;
pub mod predictions;

#[cfg(test)]
pub(crate) mod test_support;
