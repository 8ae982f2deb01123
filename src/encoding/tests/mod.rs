#[path = "tests_collections.rs"]
mod tests_collections;
#[path = "tests_limits.rs"]
mod tests_limits;
