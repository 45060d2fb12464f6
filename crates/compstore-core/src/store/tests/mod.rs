#[cfg(test)]
mod component_store_tests;
